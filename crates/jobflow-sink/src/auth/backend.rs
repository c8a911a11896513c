use crate::error::SinkResult;
use crate::sink::{AccessToken, BoxFuture};

/// A source of OAuth2 bearer tokens.
///
/// `get_token(false)` must never involve the user. `get_token(true)` may
/// open a browser and wait for consent.
pub trait IdentityBackend: Send + Sync {
    fn name(&self) -> &str;

    fn get_token(&self, interactive: bool) -> BoxFuture<'_, SinkResult<AccessToken>>;

    /// Forgets `token` so the next `get_token` does not return it again.
    fn remove_cached_token<'a>(&'a self, token: &'a AccessToken) -> BoxFuture<'a, SinkResult<()>>;
}

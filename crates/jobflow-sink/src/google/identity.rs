//! [`IdentityBackend`] backed by Google OAuth and a local token file.

use tracing::{debug, info};

use crate::auth::IdentityBackend;
use crate::error::{SinkError, SinkResult};
use crate::sink::{AccessToken, BoxFuture};

use super::config::GoogleAuthConfig;
use super::oauth::OAuthClient;
use super::tokens::TokenStorage;

/// Google identity: stored tokens, silent refresh, and the browser consent
/// flow when interaction is allowed.
pub struct GoogleIdentity {
    config: GoogleAuthConfig,
    storage: TokenStorage,
    oauth: OAuthClient,
}

impl GoogleIdentity {
    /// Creates the backend and loads any stored tokens.
    pub fn new(config: GoogleAuthConfig) -> SinkResult<Self> {
        config.validate()?;
        let oauth = OAuthClient::new(config.credentials.clone(), config.timeout)?;
        Ok(Self::with_oauth_client(config, oauth))
    }

    pub(crate) fn with_oauth_client(config: GoogleAuthConfig, oauth: OAuthClient) -> Self {
        let storage = TokenStorage::new(&config.token_path);
        if let Err(e) = storage.load() {
            debug!(error = %e, "Ignoring unreadable token file");
        }
        Self {
            config,
            storage,
            oauth,
        }
    }

    pub fn token_path(&self) -> &std::path::Path {
        self.storage.path()
    }

    /// True if a token could be produced without the browser.
    pub fn has_stored_tokens(&self) -> bool {
        self.storage
            .get()
            .is_some_and(|t| !t.is_expired() || t.refresh_token.is_some())
    }

    /// Runs the consent flow unconditionally and stores the result.
    pub async fn authorize(&self) -> SinkResult<AccessToken> {
        let tokens = self
            .oauth
            .authorize(
                &self.config.scopes,
                self.config.loopback_port_range,
                self.config.callback_timeout,
            )
            .await?;
        self.storage.set(tokens.clone())?;
        info!(path = %self.storage.path().display(), "Stored Google tokens");
        Ok(AccessToken::new(tokens.access_token))
    }

    /// Stored access token, refreshed if it expired.
    async fn silent_token(&self) -> SinkResult<AccessToken> {
        // The CLI may have authorized since this process started.
        if self.storage.get().is_none() {
            self.storage.load()?;
        }

        let tokens = self.storage.get().ok_or_else(|| {
            SinkError::auth_unavailable("not authorized, run 'jobflow auth google'")
        })?;

        if !tokens.has_scopes(&self.config.scopes) {
            return Err(SinkError::auth_unavailable(
                "stored tokens lack the spreadsheet scope, re-authorization required",
            ));
        }

        if !tokens.is_expired() {
            return Ok(AccessToken::new(tokens.access_token));
        }

        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            SinkError::auth_unavailable("access token expired and no refresh token is stored")
        })?;

        debug!("Refreshing expired access token");
        let (access_token, expires_in) = self.oauth.refresh_token(refresh_token).await?;
        self.storage.update_access_token(&access_token, expires_in)?;
        Ok(AccessToken::new(access_token))
    }

    async fn interactive_token(&self) -> SinkResult<AccessToken> {
        match self.silent_token().await {
            Ok(token) => Ok(token),
            Err(e) => {
                debug!(error = %e, "Silent token unavailable, asking the user");
                self.authorize().await
            }
        }
    }
}

impl IdentityBackend for GoogleIdentity {
    fn name(&self) -> &str {
        "google"
    }

    fn get_token(&self, interactive: bool) -> BoxFuture<'_, SinkResult<AccessToken>> {
        Box::pin(async move {
            if interactive {
                self.interactive_token().await
            } else {
                self.silent_token().await
            }
        })
    }

    fn remove_cached_token<'a>(&'a self, token: &'a AccessToken) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if self.storage.expire_access_token(token.secret())? {
                debug!("Expired stored access token");
            }
            Ok(())
        })
    }
}

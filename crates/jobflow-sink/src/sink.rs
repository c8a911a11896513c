//! The [`JobSink`] trait and the bearer token type passed to it.
//!
//! The sync engine only sees these abstractions; the Google Sheets client in
//! [`crate::sheets`] is the production implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use jobflow_core::JobRecord;

use crate::error::SinkResult;
use crate::sheets::AppendResponse;

/// A boxed future, keeping the traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An OAuth2 bearer token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

/// A remote store that job records are appended to.
///
/// Implementations issue exactly one remote call per `append` and never retry
/// internally. A rejected token is reported as
/// [`SinkErrorCode::AuthExpired`](crate::SinkErrorCode::AuthExpired) so the
/// caller can re-authorize.
pub trait JobSink: Send + Sync {
    fn name(&self) -> &str;

    fn append<'a>(
        &'a self,
        record: &'a JobRecord,
        token: &'a AccessToken,
    ) -> BoxFuture<'a, SinkResult<AppendResponse>>;
}

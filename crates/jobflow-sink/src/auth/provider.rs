use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SinkErrorCode, SinkResult};
use crate::sink::AccessToken;

use super::backend::IdentityBackend;

/// Caches a single bearer token in front of an identity backend.
///
/// Interactive acquisitions are single-flight: at most one consent flow runs
/// at a time. The cache itself is only locked for reads and writes, so
/// silent checks and `invalidate` never wait on a browser.
pub struct TokenProvider {
    backend: Arc<dyn IdentityBackend>,
    cached: Mutex<Option<AccessToken>>,
    interactive: Mutex<()>,
}

impl TokenProvider {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self {
            backend,
            cached: Mutex::new(None),
            interactive: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Returns the cached token, or asks the backend for one.
    ///
    /// Backend failures come back as `AuthUnavailable` when
    /// `interactive` is false and as `AuthDenied` otherwise.
    pub async fn acquire(&self, interactive: bool) -> SinkResult<AccessToken> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        if !interactive {
            return self.fetch(false, SinkErrorCode::AuthUnavailable).await;
        }

        let _flight = self.interactive.lock().await;
        // Another flow may have finished while we waited.
        if let Some(token) = self.cached().await {
            return Ok(token);
        }
        let token = self.fetch(true, SinkErrorCode::AuthDenied).await?;
        info!(backend = %self.backend.name(), "Authorization granted");
        Ok(token)
    }

    async fn cached(&self) -> Option<AccessToken> {
        self.cached.lock().await.clone()
    }

    async fn fetch(&self, interactive: bool, code: SinkErrorCode) -> SinkResult<AccessToken> {
        debug!(
            backend = %self.backend.name(),
            interactive,
            "Requesting token from identity backend"
        );

        let token = self
            .backend
            .get_token(interactive)
            .await
            .map_err(|e| e.recode(code))?;

        *self.cached.lock().await = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached token and asks the backend to forget it.
    ///
    /// Safe to call with nothing cached. Backend errors are logged, never
    /// returned.
    pub async fn invalidate(&self) {
        let Some(token) = self.cached.lock().await.take() else {
            debug!("No cached token to invalidate");
            return;
        };

        if let Err(e) = self.backend.remove_cached_token(&token).await {
            warn!(
                backend = %self.backend.name(),
                error = %e,
                "Failed to remove cached token from identity backend"
            );
        }
        info!(backend = %self.backend.name(), "Cached token invalidated");
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

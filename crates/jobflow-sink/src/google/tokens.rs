//! Persisted OAuth token set.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SinkError, SinkResult};

/// Refresh this long before the server-side expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn expiry_from(expires_in_secs: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in_secs
        .map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS))
}

/// An OAuth access token with its refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expiry_from(expires_in_secs),
            scopes,
            last_refresh: Utc::now(),
        }
    }

    /// True if the access token is past (or close to) its expiry.
    ///
    /// Tokens without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    pub fn update_access_token(&mut self, access_token: impl Into<String>, expires_in_secs: Option<i64>) {
        self.access_token = access_token.into();
        self.expires_at = expiry_from(expires_in_secs);
        self.last_refresh = Utc::now();
    }

    /// Marks the access token as expired, keeping the refresh token.
    pub fn expire(&mut self) {
        self.expires_at = Some(Utc::now() - Duration::seconds(1));
    }
}

/// JSON-file backed token store with an in-memory copy.
///
/// Writes go to a temp file renamed over the target; on Unix the file is
/// made `0600`.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    tokens: RwLock<Option<TokenInfo>>,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    /// Loads tokens from disk.
    ///
    /// Returns `Ok(false)` when no token file exists.
    pub fn load(&self) -> SinkResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No token file");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            SinkError::configuration(format!("failed to read token file: {e}")).with_source(e)
        })?;
        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            SinkError::configuration(format!("failed to parse token file: {e}")).with_source(e)
        })?;

        debug!(path = %self.path.display(), "Loaded tokens");
        *self.tokens.write().unwrap() = Some(tokens);
        Ok(true)
    }

    fn save(&self) -> SinkResult<()> {
        let guard = self.tokens.read().unwrap();
        let tokens = guard
            .as_ref()
            .ok_or_else(|| SinkError::internal("no tokens to save"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SinkError::configuration(format!("failed to create token directory: {e}"))
                    .with_source(e)
            })?;
        }

        let content = serde_json::to_string_pretty(tokens).map_err(|e| {
            SinkError::internal(format!("failed to serialize tokens: {e}")).with_source(e)
        })?;
        drop(guard);

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| {
            SinkError::configuration(format!("failed to write token file: {e}")).with_source(e)
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            SinkError::configuration(format!("failed to rename token file: {e}")).with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        debug!(path = %self.path.display(), "Saved tokens");
        Ok(())
    }

    pub fn get(&self) -> Option<TokenInfo> {
        self.tokens.read().unwrap().clone()
    }

    /// Replaces the token set and persists it.
    pub fn set(&self, tokens: TokenInfo) -> SinkResult<()> {
        *self.tokens.write().unwrap() = Some(tokens);
        self.save()
    }

    pub fn update_access_token(
        &self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
    ) -> SinkResult<()> {
        {
            let mut tokens = self.tokens.write().unwrap();
            let Some(t) = tokens.as_mut() else {
                return Err(SinkError::internal("no tokens to update"));
            };
            t.update_access_token(access_token, expires_in_secs);
        }
        self.save()
    }

    /// Expires the stored access token if it equals `access_token`.
    ///
    /// Returns whether anything changed.
    pub fn expire_access_token(&self, access_token: &str) -> SinkResult<bool> {
        {
            let mut tokens = self.tokens.write().unwrap();
            match tokens.as_mut() {
                Some(t) if t.access_token == access_token => t.expire(),
                _ => return Ok(false),
            }
        }
        self.save()?;
        Ok(true)
    }

    /// Removes tokens from memory and disk.
    pub fn clear(&self) -> SinkResult<()> {
        *self.tokens.write().unwrap() = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                SinkError::configuration(format!("failed to remove token file: {e}"))
                    .with_source(e)
            })?;
            info!(path = %self.path.display(), "Cleared stored tokens");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_token_is_fresh() {
        let token = TokenInfo::new(
            "access",
            Some("refresh".to_string()),
            Some(3600),
            vec!["scope".to_string()],
        );
        assert!(token.expires_at.is_some());
        assert!(!token.is_expired());
        assert!(token.has_scopes(&["scope".to_string()]));
        assert!(!token.has_scopes(&["other".to_string()]));
    }

    #[test]
    fn short_lived_token_is_already_expired() {
        // Lifetimes under the refresh margin count as expired.
        let token = TokenInfo::new("access", None, Some(30), vec![]);
        assert!(token.is_expired());

        let forever = TokenInfo::new("access", None, None, vec![]);
        assert!(!forever.is_expired());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let storage = TokenStorage::new(&path);
        storage
            .set(TokenInfo::new("access", Some("refresh".into()), Some(3600), vec![]))
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = TokenStorage::new(&path);
        assert!(reloaded.load().unwrap());
        let tokens = reloaded.get().unwrap();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let storage = TokenStorage::new(&path);
        storage.set(TokenInfo::new("access", None, None, vec![])).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        assert!(!storage.load().unwrap());
        assert!(storage.get().is_none());
    }

    #[test]
    fn corrupt_file_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "{ nope").unwrap();

        let err = TokenStorage::new(&path).load().unwrap_err();
        assert_eq!(err.code(), crate::SinkErrorCode::Configuration);
    }

    #[test]
    fn expire_only_matching_token() {
        let dir = tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("tokens.json"));
        storage
            .set(TokenInfo::new("current", Some("refresh".into()), Some(3600), vec![]))
            .unwrap();

        assert!(!storage.expire_access_token("stale").unwrap());
        assert!(!storage.get().unwrap().is_expired());

        assert!(storage.expire_access_token("current").unwrap());
        let tokens = storage.get().unwrap();
        assert!(tokens.is_expired());
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn update_access_token_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let storage = TokenStorage::new(&path);

        assert!(storage.update_access_token("new", Some(3600)).is_err());

        storage
            .set(TokenInfo::new("old", Some("refresh".into()), Some(3600), vec![]))
            .unwrap();
        storage.update_access_token("new", Some(3600)).unwrap();

        let reloaded = TokenStorage::new(&path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get().unwrap().access_token, "new");
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let storage = TokenStorage::new(&path);
        storage.set(TokenInfo::new("access", None, None, vec![])).unwrap();

        storage.clear().unwrap();
        assert!(!path.exists());
        assert!(storage.get().is_none());
    }
}

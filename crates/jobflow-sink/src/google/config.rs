//! Google identity configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{SinkError, SinkResult};

/// OAuth 2.0 client credentials from the Google Cloud Console.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Layout of the credentials JSON downloaded from the Cloud Console.
///
/// Desktop clients nest the values under `installed`, web clients under
/// `web`; some tools write them flat at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SinkError::configuration(format!(
                "failed to read credentials file {}: {e}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from any of the supported JSON layouts.
    pub fn from_json(json: &str) -> SinkResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            SinkError::configuration(format!("failed to parse credentials JSON: {e}"))
                .with_source(e)
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        match (file.client_id, file.client_secret) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret)),
            _ => Err(SinkError::configuration(
                "credentials file must contain an 'installed'/'web' section or \
                 'client_id'/'client_secret' at the root",
            )),
        }
    }

    pub fn validate(&self) -> SinkResult<()> {
        if self.client_id.is_empty() {
            return Err(SinkError::configuration("client_id is required"));
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err(SinkError::configuration(
                "client_id should end with .apps.googleusercontent.com",
            ));
        }
        if self.client_secret.is_empty() {
            return Err(SinkError::configuration("client_secret is required"));
        }
        Ok(())
    }
}

/// Configuration for [`GoogleIdentity`](super::GoogleIdentity).
#[derive(Debug, Clone)]
pub struct GoogleAuthConfig {
    pub credentials: OAuthCredentials,

    /// Where the token set is persisted.
    ///
    /// Defaults to `$XDG_DATA_HOME/jobflow/google-tokens.json`.
    pub token_path: PathBuf,

    /// Timeout for token endpoint requests.
    pub timeout: Duration,

    /// Ports tried, in order, for the loopback redirect.
    pub loopback_port_range: (u16, u16),

    pub scopes: Vec<String>,

    /// How long the interactive flow waits for the browser redirect.
    pub callback_timeout: Duration,
}

impl GoogleAuthConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read/write access to the user's spreadsheets.
    pub const SHEETS_SCOPE: &'static str = "https://www.googleapis.com/auth/spreadsheets";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            token_path: Self::default_token_path(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            loopback_port_range: (8080, 8090),
            scopes: vec![Self::SHEETS_SCOPE.to_string()],
            callback_timeout: Duration::from_secs(300),
        }
    }

    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jobflow")
            .join("google-tokens.json")
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn validate(&self) -> SinkResult<()> {
        self.credentials.validate()?;

        if self.scopes.is_empty() {
            return Err(SinkError::configuration(
                "at least one OAuth scope is required",
            ));
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(SinkError::configuration("invalid loopback port range"));
        }
        Ok(())
    }
}

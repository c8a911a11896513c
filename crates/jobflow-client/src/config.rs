//! Client and daemon configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/jobflow/config.toml` by default.
//!
//! Credential values (`client_id`, `client_secret`) support secret references,
//! see [`crate::secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jobflow_server::{DEFAULT_MAX_RETRIES, DEFAULT_MAX_SYNCED, NotifyConfig, SyncConfig};
use jobflow_sink::SheetsConfig;

/// Configuration for the jobflow CLI and daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google account settings.
    #[cfg(feature = "google")]
    pub google: Option<GoogleSettings>,

    /// Target spreadsheet.
    pub sheets: SheetsSettings,

    pub queue: QueueSettings,

    pub sync: SyncSettings,

    pub notifications: NotificationSettings,

    /// Server/connection settings.
    pub server: ServerSettings,
}

/// Where jobs are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub spreadsheet_id: Option<String>,

    /// A1 range used to locate the table.
    pub range: String,

    /// `USER_ENTERED` or `RAW`.
    pub value_input_option: String,

    /// Override for the Sheets API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    pub timeout_secs: u64,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            range: SheetsConfig::DEFAULT_RANGE.to_string(),
            value_input_option: SheetsConfig::DEFAULT_VALUE_INPUT_OPTION.to_string(),
            api_base: None,
            timeout_secs: SheetsConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SheetsSettings {
    /// Builds and validates the sink configuration.
    pub fn to_sheets_config(&self) -> Result<SheetsConfig, String> {
        let id = self
            .spreadsheet_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                format!(
                    "no spreadsheet configured. Add to {}:\n  \
                     [sheets]\n  \
                     spreadsheet_id = \"<id from the sheet URL>\"",
                    ClientConfig::default_path().display()
                )
            })?;

        let mut config = SheetsConfig::new(id)
            .with_range(&self.range)
            .with_value_input_option(&self.value_input_option)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(ref base) = self.api_base {
            config = config.with_api_base(base);
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Queue persistence and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// State file; defaults to `$XDG_DATA_HOME/jobflow/state.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Failed attempts before a job is given up on.
    pub max_retries: u32,

    /// Synced jobs kept for the record.
    pub max_synced: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_retries: DEFAULT_MAX_RETRIES,
            max_synced: DEFAULT_MAX_SYNCED,
        }
    }
}

impl QueueSettings {
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| ClientConfig::default_data_dir().join("state.json"))
    }
}

/// Scheduled sync passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub interval_secs: u64,

    /// Whether a pass may open the browser for consent.
    pub interactive_auth: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            interactive_auth: true,
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self, queue: &QueueSettings) -> SyncConfig {
        SyncConfig::default()
            .with_max_retries(queue.max_retries)
            .with_interactive_auth(self.interactive_auth)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Desktop notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,

    pub timeout_secs: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            icon_path: None,
            timeout_secs: 10,
        }
    }
}

impl NotificationSettings {
    pub fn to_notify_config(&self) -> NotifyConfig {
        let config = NotifyConfig::default()
            .with_enabled(self.enabled)
            .with_timeout(self.timeout_secs);
        match self.icon_path {
            Some(ref icon) => config.with_icon_path(icon),
            None => config,
        }
    }
}

/// Server/connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Path to the daemon socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Request timeout in seconds for quick requests.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout: 5,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jobflow")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jobflow")
    }

    /// The socket path: CLI flag, then config, then the runtime default.
    pub fn socket_path(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.server.socket_path.clone())
            .unwrap_or_else(jobflow_server::default_socket_path)
    }
}

/// Google account settings.
///
/// Credentials are stored inline and support secret references
/// (`pass::…`, `env::…`).
#[cfg(feature = "google")]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,

    pub client_secret: Option<String>,

    /// Path to token storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Resolves credentials and builds the identity backend configuration.
    pub fn to_auth_config(&self) -> Result<jobflow_sink::google::GoogleAuthConfig, String> {
        use jobflow_sink::google::GoogleAuthConfig;

        let credentials = self.resolve_credentials()?;
        credentials.validate().map_err(|e| e.to_string())?;

        let config = GoogleAuthConfig::new(credentials);
        Ok(match self.token_path {
            Some(ref path) => config.with_token_path(path),
            None => config,
        })
    }

    /// Both `client_id` and `client_secret` must be set; each goes through
    /// [`crate::secret::resolve`].
    pub(crate) fn resolve_credentials(
        &self,
    ) -> Result<jobflow_sink::google::OAuthCredentials, String> {
        use jobflow_sink::google::OAuthCredentials;

        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 Or run: jobflow auth google --credentials-file <path>",
                ClientConfig::default_path().display()
            )
        })?;

        let raw_secret = self.client_secret.as_deref().ok_or_else(|| {
            "client_secret is missing from [google] section in config.toml".to_string()
        })?;

        let id = crate::secret::resolve(raw_id)
            .map_err(|e| format!("failed to resolve client_id: {e}"))?;
        let secret = crate::secret::resolve(raw_secret)
            .map_err(|e| format!("failed to resolve client_secret: {e}"))?;

        Ok(OAuthCredentials::new(id, secret))
    }
}

//! Desktop notifications for sync outcomes.
//!
//! The sync engine emits a [`Notice`] when a job reaches the sheet or when it
//! is given up on. Delivery is fire-and-forget: a notification that cannot be
//! shown is logged and otherwise ignored.

use std::sync::Mutex;
use std::time::Duration;

use notify_rust::Notification;
#[cfg(target_os = "linux")]
use notify_rust::Urgency;
use tracing::{debug, error, info};

use jobflow_core::JobRecord;

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A job was appended to the tracker.
    JobSaved { title: String, company: String },
    /// A job ran out of retries.
    SyncFailed { title: String },
}

impl Notice {
    pub fn job_saved(record: &JobRecord) -> Self {
        Self::JobSaved {
            title: record.display_title().to_string(),
            company: record.display_company().to_string(),
        }
    }

    pub fn sync_failed(record: &JobRecord) -> Self {
        Self::SyncFailed {
            title: record.display_title().to_string(),
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Self::JobSaved { .. } => "JobFlow - Job Saved!",
            Self::SyncFailed { .. } => "JobFlow - Sync Failed",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::JobSaved { title, company } => {
                format!("\"{title}\" at {company} saved to your tracker.")
            }
            Self::SyncFailed { title } => {
                format!("Could not save \"{title}\". Please check your connection.")
            }
        }
    }
}

/// Delivers notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Configuration for the desktop notifier.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Application name for notifications.
    pub app_name: String,
    /// Notification timeout in seconds.
    pub timeout_secs: u32,
    /// Whether notifications are enabled.
    pub enabled: bool,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_name: "jobflow".to_string(),
            timeout_secs: 10,
            enabled: true,
            icon_path: None,
        }
    }
}

impl NotifyConfig {
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_icon_path(mut self, path: impl Into<String>) -> Self {
        self.icon_path = Some(path.into());
        self
    }
}

/// Shows notices through the desktop notification service.
pub struct DesktopNotifier {
    config: NotifyConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notice: &Notice) {
        if !self.config.enabled {
            debug!(summary = notice.summary(), "Notifications disabled, skipping");
            return;
        }

        let body = notice.body();
        let mut notification = Notification::new();
        notification
            .appname(&self.config.app_name)
            .summary(notice.summary())
            .body(&body)
            .timeout(Duration::from_secs(self.config.timeout_secs as u64));

        if let Some(ref icon) = self.config.icon_path {
            notification.icon(icon);
        }

        #[cfg(target_os = "linux")]
        notification.urgency(match notice {
            Notice::JobSaved { .. } => Urgency::Low,
            Notice::SyncFailed { .. } => Urgency::Critical,
        });

        match notification.show() {
            Ok(_) => info!(summary = notice.summary(), body = %body, "Notification sent"),
            Err(e) => error!(error = %e, summary = notice.summary(), "Failed to send notification"),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

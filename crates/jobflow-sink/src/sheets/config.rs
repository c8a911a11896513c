use std::time::Duration;

use url::Url;

use crate::error::{SinkError, SinkResult};

/// Where and how rows are appended.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// A1 range the table is anchored at.
    pub range: String,
    /// `USER_ENTERED` lets the sheet parse dates and numbers.
    pub value_input_option: String,
    pub api_base: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl SheetsConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://sheets.googleapis.com/v4/spreadsheets";
    pub const DEFAULT_RANGE: &'static str = "Sheet1!A1";
    pub const DEFAULT_VALUE_INPUT_OPTION: &'static str = "USER_ENTERED";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: Self::DEFAULT_RANGE.to_string(),
            value_input_option: Self::DEFAULT_VALUE_INPUT_OPTION.to_string(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("jobflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn with_value_input_option(mut self, option: impl Into<String>) -> Self {
        self.value_input_option = option.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `POST` target for appending to the configured range.
    pub fn append_url(&self) -> String {
        format!(
            "{}/{}/values/{}:append?valueInputOption={}",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&self.range),
            urlencoding::encode(&self.value_input_option),
        )
    }

    /// Browser URL of the tracker sheet.
    pub fn spreadsheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit",
            self.spreadsheet_id
        )
    }

    pub fn validate(&self) -> SinkResult<()> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(SinkError::configuration("spreadsheet_id is required"));
        }
        if self.range.trim().is_empty() {
            return Err(SinkError::configuration("range must not be empty"));
        }
        Url::parse(&self.api_base).map_err(|e| {
            SinkError::configuration(format!("invalid api_base '{}': {e}", self.api_base))
                .with_source(e)
        })?;
        Ok(())
    }
}

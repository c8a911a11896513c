//! Job records captured from job boards.
//!
//! A [`JobRecord`] is the unit that travels from a capture source through the
//! queue to the spreadsheet sink. Field names on the wire follow what the
//! page scrapers emit (`date`, `platform`), with the longer names accepted as
//! aliases.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Status written to the sheet when the capture did not set one.
pub const DEFAULT_STATUS: &str = "Saved";

/// Column headers of the tracker sheet, in row order.
pub const ROW_COLUMNS: [&str; 8] = [
    "Title", "Company", "Location", "Salary", "URL", "Date", "Status", "Notes",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors raised when a captured record cannot be accepted.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job url is required")]
    MissingUrl,

    #[error("invalid job url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid capture date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unknown source platform '{0}'")]
    UnknownPlatform(String),
}

/// The kind of page a job was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourcePlatform {
    #[serde(rename = "LinkedIn")]
    LinkedIn,
    #[serde(rename = "Career Site")]
    CareerSite,
}

impl SourcePlatform {
    /// Returns the label used on the wire and in the sheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn",
            Self::CareerSite => "Career Site",
        }
    }

    /// Guesses the platform from a posting URL.
    ///
    /// Anything hosted on `linkedin.com` is LinkedIn, everything else is
    /// treated as a company career site.
    pub fn detect(url: &str) -> Self {
        let is_linkedin = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| host == "linkedin.com" || host.ends_with(".linkedin.com"));

        if is_linkedin {
            Self::LinkedIn
        } else {
            Self::CareerSite
        }
    }
}

impl fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcePlatform {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "linkedin" => Ok(Self::LinkedIn),
            "careersite" | "career" => Ok(Self::CareerSite),
            _ => Err(JobError::UnknownPlatform(s.to_string())),
        }
    }
}

/// A captured job posting.
///
/// Every field except `url` is optional; absent values become empty cells in
/// the sheet. Records are immutable once captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default)]
    pub url: String,
    /// Capture date, `YYYY-MM-DD`.
    #[serde(
        rename = "date",
        alias = "captureDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub capture_date: Option<String>,
    #[serde(
        rename = "platform",
        alias = "sourcePlatform",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_platform: Option<SourcePlatform>,
    /// Free-form tracker status, "Saved" when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl JobRecord {
    /// Creates a record for the given posting URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_salary(mut self, salary: impl Into<String>) -> Self {
        self.salary = Some(salary.into());
        self
    }

    #[must_use]
    pub fn with_capture_date(mut self, date: NaiveDate) -> Self {
        self.capture_date = Some(date.format(DATE_FORMAT).to_string());
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: SourcePlatform) -> Self {
        self.source_platform = Some(platform);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Checks that the record can be queued.
    ///
    /// The URL must be present and absolute. A capture date, when given,
    /// must be a calendar date in `YYYY-MM-DD` form.
    pub fn validate(&self) -> Result<(), JobError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(JobError::MissingUrl);
        }
        Url::parse(url).map_err(|source| JobError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        if let Some(date) = self.capture_date.as_deref().filter(|d| !d.is_empty())
            && NaiveDate::parse_from_str(date, DATE_FORMAT).is_err()
        {
            return Err(JobError::InvalidDate(date.to_string()));
        }

        Ok(())
    }

    /// Title used in notifications.
    pub fn display_title(&self) -> &str {
        non_empty(&self.title).unwrap_or("Untitled job")
    }

    /// Company used in notifications.
    pub fn display_company(&self) -> &str {
        non_empty(&self.company).unwrap_or("unknown company")
    }

    /// Builds the sheet row for this record.
    ///
    /// Columns follow [`ROW_COLUMNS`]. Missing values become `""`, except the
    /// date which falls back to `today` and the status which falls back to
    /// [`DEFAULT_STATUS`].
    pub fn to_row(&self, today: NaiveDate) -> [String; 8] {
        let cell = |value: &Option<String>| value.clone().unwrap_or_default();

        let date = non_empty(&self.capture_date)
            .map(str::to_string)
            .unwrap_or_else(|| today.format(DATE_FORMAT).to_string());
        let status = non_empty(&self.status).unwrap_or(DEFAULT_STATUS).to_string();

        [
            cell(&self.title),
            cell(&self.company),
            cell(&self.location),
            cell(&self.salary),
            self.url.clone(),
            date,
            status,
            cell(&self.notes),
        ]
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn deserializes_scraper_payload() {
        let json = r#"{
            "title": "Senior Rust Engineer",
            "company": "Acme",
            "location": "Remote",
            "salary": "$150k",
            "url": "https://www.linkedin.com/jobs/view/123",
            "platform": "LinkedIn",
            "date": "2024-03-14",
            "status": "Saved"
        }"#;

        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.title.as_deref(), Some("Senior Rust Engineer"));
        assert_eq!(record.source_platform, Some(SourcePlatform::LinkedIn));
        assert_eq!(record.capture_date.as_deref(), Some("2024-03-14"));
        assert!(record.notes.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn accepts_long_field_aliases() {
        let json = r#"{
            "url": "https://careers.example.com/42",
            "captureDate": "2024-01-02",
            "sourcePlatform": "Career Site"
        }"#;

        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.capture_date.as_deref(), Some("2024-01-02"));
        assert_eq!(record.source_platform, Some(SourcePlatform::CareerSite));
    }

    #[test]
    fn serializes_short_names_and_skips_absent_fields() {
        let record = JobRecord::new("https://example.com/job")
            .with_title("SWE")
            .with_platform(SourcePlatform::CareerSite);

        insta::assert_json_snapshot!(record, @r#"
        {
          "title": "SWE",
          "url": "https://example.com/job",
          "platform": "Career Site"
        }
        "#);
    }

    #[test]
    fn row_follows_column_order() {
        let record = JobRecord::new("https://example.com/job")
            .with_title("SWE")
            .with_company("Acme")
            .with_location("Berlin")
            .with_salary("100k")
            .with_capture_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .with_status("Applied")
            .with_notes("referral");

        assert_eq!(
            record.to_row(today()),
            [
                "SWE",
                "Acme",
                "Berlin",
                "100k",
                "https://example.com/job",
                "2024-02-01",
                "Applied",
                "referral",
            ]
        );
    }

    #[test]
    fn row_fills_missing_fields() {
        let record = JobRecord::new("https://example.com/job").with_title("SWE");

        assert_eq!(
            record.to_row(today()),
            [
                "SWE",
                "",
                "",
                "",
                "https://example.com/job",
                "2024-03-15",
                "Saved",
                "",
            ]
        );
    }

    #[test]
    fn validate_rejects_missing_url() {
        let record = JobRecord::default().with_title("SWE");
        assert!(matches!(record.validate(), Err(JobError::MissingUrl)));

        let record = JobRecord::new("   ");
        assert!(matches!(record.validate(), Err(JobError::MissingUrl)));
    }

    #[test]
    fn validate_rejects_relative_url() {
        let record = JobRecord::new("/jobs/view/123");
        assert!(matches!(
            record.validate(),
            Err(JobError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_date() {
        let mut record = JobRecord::new("https://example.com/job");
        record.capture_date = Some("15/03/2024".to_string());
        assert!(matches!(record.validate(), Err(JobError::InvalidDate(_))));
    }

    #[test]
    fn display_fallbacks() {
        let record = JobRecord::new("https://example.com/job").with_title("  ");
        assert_eq!(record.display_title(), "Untitled job");
        assert_eq!(record.display_company(), "unknown company");
    }

    #[test]
    fn platform_detection() {
        assert_eq!(
            SourcePlatform::detect("https://www.linkedin.com/jobs/view/1"),
            SourcePlatform::LinkedIn
        );
        assert_eq!(
            SourcePlatform::detect("https://jobs.lever.co/acme/1"),
            SourcePlatform::CareerSite
        );
        assert_eq!(
            SourcePlatform::detect("not a url"),
            SourcePlatform::CareerSite
        );
    }

    #[test]
    fn platform_parsing() {
        assert_eq!("LinkedIn".parse::<SourcePlatform>().unwrap(), SourcePlatform::LinkedIn);
        assert_eq!(
            "career-site".parse::<SourcePlatform>().unwrap(),
            SourcePlatform::CareerSite
        );
        assert!("indeed".parse::<SourcePlatform>().is_err());
    }
}

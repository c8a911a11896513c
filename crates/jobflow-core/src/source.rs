//! Capture sources.
//!
//! Anything that can produce a [`JobRecord`] from a page or from user input
//! implements [`JobSource`]. Page scrapers live outside this workspace and
//! talk to the daemon over the socket; in-process sources (the CLI, tests)
//! implement the trait directly.

use crate::job::{JobRecord, SourcePlatform};

/// A source of captured job postings.
pub trait JobSource {
    /// The platform this source extracts from.
    fn platform(&self) -> SourcePlatform;

    /// Extracts the posting currently held by the source.
    fn extract_job_data(&self) -> JobRecord;
}

/// A source that always yields the same record.
///
/// The record's platform is filled in from its URL when it was not set.
#[derive(Debug, Clone)]
pub struct StaticSource {
    record: JobRecord,
}

impl StaticSource {
    pub fn new(record: JobRecord) -> Self {
        Self { record }
    }
}

impl JobSource for StaticSource {
    fn platform(&self) -> SourcePlatform {
        self.record
            .source_platform
            .unwrap_or_else(|| SourcePlatform::detect(&self.record.url))
    }

    fn extract_job_data(&self) -> JobRecord {
        let mut record = self.record.clone();
        record.source_platform = Some(self.platform());
        record
    }
}

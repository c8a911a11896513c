//! Core types: job records, capture sources, tracing

pub mod job;
pub mod source;
pub mod tracing;

pub use job::{DEFAULT_STATUS, JobError, JobRecord, ROW_COLUMNS, SourcePlatform};
pub use source::{JobSource, StaticSource};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};

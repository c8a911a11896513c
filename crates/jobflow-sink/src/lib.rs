//! Token acquisition and the remote sink for jobflow.
//!
//! - [`auth`]: the cached [`TokenProvider`] over an [`IdentityBackend`]
//! - [`google`]: Google OAuth identity with a persisted token file
//! - [`sheets`]: the Google Sheets append client implementing [`JobSink`]

pub mod auth;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod sheets;
pub mod sink;

#[cfg(test)]
mod test_http;

pub use auth::{IdentityBackend, TokenProvider};
pub use error::{SinkError, SinkErrorCode, SinkResult};
pub use sheets::{AppendRequest, AppendResponse, SheetsClient, SheetsConfig, classify_response};
pub use sink::{AccessToken, BoxFuture, JobSink};

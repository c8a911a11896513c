//! Google Sheets sink: one `values:append` call per job record.

mod client;
mod config;

pub use client::{AppendRequest, AppendResponse, SheetsClient, UpdatedRange, classify_response};
pub use config::SheetsConfig;

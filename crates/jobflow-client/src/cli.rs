//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use jobflow_core::{JobRecord, SourcePlatform};

/// jobflow - capture job postings into your tracker sheet
#[derive(Debug, Parser)]
#[command(name = "jobflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "JOBFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Path to the daemon socket
    #[arg(long, env = "JOBFLOW_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Request timeout in seconds (defaults to `[server] timeout`)
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queue a job posting and sync it
    Save(SaveArgs),

    /// Show daemon and queue status
    Status,

    /// Run a sync pass now
    Sync,

    /// Stop scheduled syncs until resumed
    Pause,

    /// Resume scheduled syncs
    Resume,

    /// Authorization commands
    Auth {
        #[command(subcommand)]
        action: AuthCommand,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Open the tracker spreadsheet in the browser
    Open,

    /// Start the daemon in the foreground
    Server,

    /// Ask the running daemon to exit
    Stop,
}

/// A job posting entered by hand.
#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Posting URL
    pub url: String,

    #[arg(long, short)]
    pub title: Option<String>,

    #[arg(long, short)]
    pub company: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub salary: Option<String>,

    /// Capture date (YYYY-MM-DD, defaults to the sync date)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Source platform (detected from the URL when omitted)
    #[arg(long)]
    pub platform: Option<SourcePlatform>,

    /// Tracker status
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

impl SaveArgs {
    pub fn to_record(&self) -> JobRecord {
        let record = JobRecord {
            title: self.title.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
            salary: self.salary.clone(),
            status: self.status.clone(),
            notes: self.notes.clone(),
            source_platform: self.platform,
            ..JobRecord::new(&self.url)
        };
        match self.date {
            Some(date) => record.with_capture_date(date),
            None => record,
        }
    }
}

/// Authorization actions.
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authorize jobflow with your Google account
    #[cfg(feature = "google")]
    Google {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        ///
        /// The JSON file downloaded from the OAuth 2.0 credentials page.
        /// Alternative to providing client_id and client_secret separately.
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Authorize again even if tokens are stored
        #[arg(long, short)]
        force: bool,
    },

    /// Ask the daemon whether it holds a usable token
    Status,

    /// Ask the daemon to run the consent flow
    Request,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

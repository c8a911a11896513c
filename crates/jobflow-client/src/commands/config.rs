//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Prints the effective configuration.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", path.display());
    println!("{toml_str}");
    Ok(())
}

/// Checks everything the daemon needs to start.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    let problems = problems(config);
    if !problems.is_empty() {
        return Err(ClientError::Config(problems.join("\n")));
    }
    println!("Configuration is valid.");
    Ok(())
}

pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

fn problems(config: &ClientConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = config.sheets.to_sheets_config() {
        problems.push(e);
    }
    if config.queue.max_retries == 0 {
        problems.push("[queue] max_retries must be at least 1".to_string());
    }
    if config.sync.interval_secs == 0 {
        problems.push("[sync] interval_secs must be at least 1".to_string());
    }

    #[cfg(feature = "google")]
    match config.google {
        Some(ref google) => {
            if let Err(e) = google.to_auth_config() {
                problems.push(format!("invalid Google credentials: {e}"));
            }
        }
        None => problems.push("no [google] section; run `jobflow auth google` first".to_string()),
    }

    problems
}

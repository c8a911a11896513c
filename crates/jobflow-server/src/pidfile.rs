//! Single-instance guard for the daemon.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info, warn};

use crate::config::runtime_path;
use crate::error::{ServerError, ServerResult};

/// A PID file that lives as long as this value.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes our PID to `path`.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if the file names a live
    /// process. Stale or unreadable files are replaced.
    pub fn create(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();

        if path.exists() {
            match read_pid(&path) {
                Some(pid) if is_process_running(pid) => {
                    return Err(ServerError::already_running(path.to_string_lossy()));
                }
                Some(pid) => {
                    warn!(path = %path.display(), pid, "Removing stale PID file");
                    fs::remove_file(&path)?;
                }
                None => {
                    warn!(path = %path.display(), "Removing invalid PID file");
                    fs::remove_file(&path)?;
                }
            }
        }

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let pid = process::id();
        let mut file = File::create(&path)?;
        writeln!(file, "{pid}")?;
        file.sync_all()?;

        info!(path = %path.display(), pid, "Created PID file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed PID file"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove PID file"),
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// `$XDG_RUNTIME_DIR/jobflow.pid`, or `/tmp/jobflow-$UID.pid`.
pub fn default_pid_path() -> PathBuf {
    runtime_path("pid")
}

//! Commands that talk to the running daemon.

use jobflow_core::{JobRecord, JobSource, StaticSource};
use jobflow_protocol::{ActionResult, Request, Response, StatusInfo};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::{SLOW_REQUEST_TIMEOUT, SocketClient};

/// Queues `record` and waits for the sync pass it triggers.
pub async fn save(client: &SocketClient, record: JobRecord) -> ClientResult<()> {
    let record = StaticSource::new(record).extract_job_data();
    record
        .validate()
        .map_err(|e| ClientError::Action(e.to_string()))?;

    let title = record.display_title().to_string();
    let response = client
        .with_timeout(SLOW_REQUEST_TIMEOUT)
        .send(Request::save_job(record))
        .await?;
    expect_action(response)?;

    info!(title = %title, "job queued");
    println!("Saved \"{title}\".");
    Ok(())
}

/// Prints daemon and queue status.
pub async fn status(client: &SocketClient) -> ClientResult<()> {
    match client.send(Request::Status).await? {
        Response::Status { info } => {
            print!("{}", render_status(&info));
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Runs a sync pass now.
pub async fn sync(client: &SocketClient) -> ClientResult<()> {
    let response = client
        .with_timeout(SLOW_REQUEST_TIMEOUT)
        .send(Request::SyncQueue)
        .await?;
    expect_action(response)?;
    println!("Sync pass finished.");
    Ok(())
}

/// Pauses or resumes scheduled sync passes.
pub async fn set_paused(client: &SocketClient, paused: bool) -> ClientResult<()> {
    let request = if paused {
        Request::PauseSync
    } else {
        Request::ResumeSync
    };
    match client.send(request).await? {
        Response::Ok if paused => {
            println!("Scheduled sync paused. `jobflow sync` still runs a pass.");
            Ok(())
        }
        Response::Ok => {
            println!("Scheduled sync resumed.");
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Asks the daemon to exit.
pub async fn stop(client: &SocketClient) -> ClientResult<()> {
    match client.send(Request::Shutdown).await? {
        Response::Ok => {
            println!("Daemon stopping.");
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Opens the tracker spreadsheet in the browser.
pub fn open_sheet(config: &ClientConfig) -> ClientResult<()> {
    let sheets = config.sheets.to_sheets_config().map_err(ClientError::Config)?;
    let url = sheets.spreadsheet_url();
    info!(url = %url, "opening spreadsheet");
    open::that(&url).map_err(|e| ClientError::Action(format!("failed to open {url}: {e}")))?;
    println!("{url}");
    Ok(())
}

pub(crate) fn expect_action(response: Response) -> ClientResult<()> {
    match response {
        Response::Action {
            result: ActionResult { success: true, .. },
        } => Ok(()),
        Response::Action {
            result: ActionResult { error, .. },
        } => Err(ClientError::Daemon(
            error.unwrap_or_else(|| "request failed".to_string()),
        )),
        other => Err(unexpected(&other)),
    }
}

pub(crate) fn unexpected(response: &Response) -> ClientError {
    ClientError::Daemon(format!("unexpected response: {response:?}"))
}

fn render_status(info: &StatusInfo) -> String {
    let mut out = String::new();
    let queue = &info.queue;
    out.push_str(&format!(
        "queue: {} jobs ({} pending, {} synced, {} failed)\n",
        queue.total, queue.pending, queue.synced, queue.failed
    ));
    match info.last_sync {
        Some(at) => out.push_str(&format!("last sync: {}\n", at.format("%Y-%m-%d %H:%M:%S UTC"))),
        None => out.push_str("last sync: never\n"),
    }
    if let Some(summary) = info.last_summary {
        out.push_str(&format!(
            "last pass: {} saved, {} failed, {} still pending\n",
            summary.succeeded, summary.failed, summary.still_pending
        ));
    }
    if let Some(ref error) = info.last_error {
        out.push_str(&format!("last error: {error}\n"));
    }
    if info.paused {
        out.push_str("scheduled sync: paused\n");
    }
    out.push_str(&format!("uptime: {}s\n", info.uptime_seconds));
    out
}

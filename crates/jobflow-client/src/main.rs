//! jobflow CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use jobflow_client::cli::{AuthCommand, Cli, Command, ConfigAction};
use jobflow_client::commands;
use jobflow_client::config::ClientConfig;
use jobflow_client::error::{ClientError, ClientResult};
use jobflow_client::SocketClient;
use jobflow_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else if matches!(cli.command, Some(Command::Server)) {
        TracingConfig::daemon()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    let timeout = Duration::from_secs(cli.timeout.unwrap_or(config.server.timeout));
    let client = SocketClient::new(config.socket_path(cli.socket_path.as_deref()), timeout);

    match cli.command {
        Some(Command::Save(args)) => commands::jobs::save(&client, args.to_record()).await,
        Some(Command::Status) => commands::jobs::status(&client).await,
        Some(Command::Sync) => commands::jobs::sync(&client).await,
        Some(Command::Pause) => commands::jobs::set_paused(&client, true).await,
        Some(Command::Resume) => commands::jobs::set_paused(&client, false).await,
        Some(Command::Stop) => commands::jobs::stop(&client).await,
        Some(Command::Open) => commands::jobs::open_sheet(&config),
        Some(Command::Server) => commands::server::run(cli.socket_path.as_deref(), &config).await,
        Some(Command::Auth { action }) => match action {
            #[cfg(feature = "google")]
            AuthCommand::Google {
                client_id,
                client_secret,
                credentials_file,
                force,
            } => {
                commands::auth::google(
                    client_id,
                    client_secret,
                    credentials_file,
                    force,
                    &config,
                    &config_path,
                )
                .await
            }
            AuthCommand::Status => commands::auth::status(&client).await,
            AuthCommand::Request => commands::auth::request(&client).await,
        },
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
        None => {
            println!("jobflow - capture job postings into your tracker sheet");
            println!();
            println!("Run 'jobflow --help' for usage information.");
            println!();
            println!("Quick start:");
            println!("  1. Authorize Google: jobflow auth google --client-id <ID> --client-secret <SECRET>");
            println!("  2. Set [sheets] spreadsheet_id in {}", config_path.display());
            println!("  3. Start the daemon: jobflow server");
            println!("  4. Save a posting: jobflow save <URL> --title <TITLE> --company <COMPANY>");
            Ok(())
        }
    }
}

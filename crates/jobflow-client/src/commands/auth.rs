//! Authorization commands.

#[cfg(feature = "google")]
use std::path::{Path, PathBuf};

use jobflow_protocol::{Request, Response};
#[cfg(feature = "google")]
use tracing::info;

use crate::commands::jobs::{expect_action, unexpected};
#[cfg(feature = "google")]
use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};
use crate::socket::{SLOW_REQUEST_TIMEOUT, SocketClient};

/// Asks the daemon whether it can get a token without prompting.
pub async fn status(client: &SocketClient) -> ClientResult<()> {
    match client.send(Request::GetAuthStatus).await? {
        Response::AuthStatus { authenticated: true } => {
            println!("Authorized.");
            Ok(())
        }
        Response::AuthStatus {
            authenticated: false,
        } => {
            println!("Not authorized. Run `jobflow auth request` or `jobflow auth google`.");
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Has the daemon run the consent flow.
pub async fn request(client: &SocketClient) -> ClientResult<()> {
    println!("Waiting for authorization in the browser...");
    let response = client
        .with_timeout(SLOW_REQUEST_TIMEOUT)
        .send(Request::RequestAuth)
        .await?;
    expect_action(response)?;
    println!("Authorization successful.");
    Ok(())
}

/// Runs the Google consent flow from the CLI.
///
/// Credentials come from CLI flags, a `--credentials-file`, or
/// `config.toml`. Credentials given on the command line are persisted to
/// `config.toml` so the daemon can find them.
#[cfg(feature = "google")]
pub async fn google(
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    force: bool,
    config: &ClientConfig,
    config_path: &Path,
) -> ClientResult<()> {
    use jobflow_sink::google::{GoogleAuthConfig, GoogleIdentity, OAuthCredentials};

    let (final_client_id, final_client_secret, source) = resolve_google_credentials(
        client_id,
        client_secret,
        credentials_file,
        config.google.as_ref(),
    )?;

    let credentials = OAuthCredentials::new(&final_client_id, &final_client_secret);
    credentials
        .validate()
        .map_err(|e| ClientError::Config(format!("invalid Google credentials: {e}")))?;

    let mut auth_config = GoogleAuthConfig::new(credentials);
    if let Some(ref google) = config.google
        && let Some(ref path) = google.token_path
    {
        auth_config = auth_config.with_token_path(path);
    }

    let identity = GoogleIdentity::new(auth_config)?;

    if identity.has_stored_tokens() && !force {
        save_credentials(config_path, &final_client_id, &final_client_secret, &source)?;
        println!("Already authorized with Google.");
        println!("Use --force to authorize again.");
        return Ok(());
    }

    println!("Starting Google authorization...");
    println!();
    println!("A browser window will open for you to grant access to your spreadsheets.");
    println!("If the browser doesn't open, check the terminal for a URL to copy.");
    println!();

    identity.authorize().await?;

    save_credentials(config_path, &final_client_id, &final_client_secret, &source)?;

    info!(token_path = %identity.token_path().display(), "Google authorization successful");
    println!();
    println!("Authorization successful!");
    println!("Tokens saved to {}.", identity.token_path().display());

    Ok(())
}

/// Where the credentials were resolved from.
#[cfg(feature = "google")]
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// CLI flags or `--credentials-file`.
    Cli,
    /// Already in config.toml.
    Config,
}

/// Writes credentials under `[google]`, keeping the rest of the file.
///
/// No-op for credentials that came from the file in the first place.
#[cfg(feature = "google")]
fn save_credentials(
    config_path: &Path,
    client_id: &str,
    client_secret: &str,
    source: &CredentialSource,
) -> ClientResult<()> {
    if *source == CredentialSource::Config {
        return Ok(());
    }

    let content = if config_path.exists() {
        std::fs::read_to_string(config_path)?
    } else {
        String::new()
    };

    let mut doc = content.parse::<toml_edit::DocumentMut>().map_err(|e| {
        ClientError::Config(format!(
            "could not parse {} for writing: {e}",
            config_path.display()
        ))
    })?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"]
        .as_table_mut()
        .ok_or_else(|| ClientError::Config("[google] in config.toml is not a table".into()))?;
    google["client_id"] = toml_edit::value(client_id);
    google["client_secret"] = toml_edit::value(client_secret);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, doc.to_string())?;

    info!(path = %config_path.display(), "credentials saved");
    println!("Credentials saved to {}", config_path.display());
    Ok(())
}

/// Resolves Google credentials from multiple sources.
///
/// Priority (highest to lowest):
/// 1. CLI `--client-id` + `--client-secret`
/// 2. CLI `--credentials-file` (Google Cloud Console JSON)
/// 3. `config.toml` `[google]` section
#[cfg(feature = "google")]
fn resolve_google_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    config_google: Option<&GoogleSettings>,
) -> ClientResult<(String, String, CredentialSource)> {
    use jobflow_sink::google::OAuthCredentials;

    if let (Some(id), Some(secret)) = (&cli_client_id, &cli_client_secret) {
        return Ok((id.clone(), secret.clone(), CredentialSource::Cli));
    }

    if let Some(ref path) = cli_credentials_file {
        let creds = OAuthCredentials::from_file(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {e}",
                path.display()
            ))
        })?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Cli));
    }

    if let Some(google) = config_google
        && google.client_id.is_some()
        && google.client_secret.is_some()
    {
        let creds = google.resolve_credentials().map_err(|e| {
            ClientError::Config(format!(
                "failed to resolve Google credentials from config: {e}"
            ))
        })?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Config));
    }

    if cli_client_id.is_some() || cli_client_secret.is_some() {
        return Err(ClientError::Config(
            "both --client-id and --client-secret are required when providing credentials directly"
                .to_string(),
        ));
    }

    Err(ClientError::Config(format!(
        "Google credentials are required. Provide via:\n  \
         - client_id + client_secret in {}\n  \
         - --client-id and --client-secret flags\n  \
         - --credentials-file flag (path to Google Cloud Console JSON)\n  \
         - GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET env vars",
        ClientConfig::default_path().display()
    )))
}

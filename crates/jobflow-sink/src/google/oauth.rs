//! OAuth 2.0 authorization-code flow with PKCE and a loopback redirect.
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a listener on 127.0.0.1 and open the consent page in the browser
//! 3. Read the authorization code from the redirect
//! 4. Exchange code + verifier for access and refresh tokens

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{SinkError, SinkResult};

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Verifier entropy in bytes, before base64.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Talks to Google's OAuth endpoints.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
    token_url: String,
}

impl OAuthClient {
    pub fn new(credentials: OAuthCredentials, timeout: Duration) -> SinkResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SinkError::internal(format!("failed to create HTTP client: {e}")).with_source(e)
            })?;

        Ok(Self {
            credentials,
            http_client,
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    /// Points the client at another token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Runs the interactive consent flow and returns the granted tokens.
    ///
    /// Fails with `AuthDenied` if the user refuses, the state does not
    /// match, or no redirect arrives within `callback_timeout`.
    pub async fn authorize(
        &self,
        scopes: &[String],
        port_range: (u16, u16),
        callback_timeout: Duration,
    ) -> SinkResult<TokenInfo> {
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback_server(port_range)?;
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let auth_url = pkce.build_auth_url(&self.credentials.client_id, &redirect_uri, scopes);

        info!(port, "Starting OAuth consent flow");
        debug!(url = %auth_url, "Authorization URL");

        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "Failed to open browser");
            eprintln!("\nOpen this URL in your browser to authorize jobflow:\n\n{auth_url}\n");
        }

        let (code, state) =
            tokio::task::spawn_blocking(move || wait_for_callback(listener, callback_timeout))
                .await
                .map_err(|e| {
                    SinkError::internal(format!("callback listener panicked: {e}")).with_source(e)
                })??;

        if state != pkce.state {
            return Err(SinkError::auth_denied(
                "OAuth state mismatch, ignoring redirect",
            ));
        }

        info!("Received authorization code, exchanging for tokens");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await
    }

    /// Trades a refresh token for a new access token.
    ///
    /// Returns the access token and its lifetime in seconds.
    pub async fn refresh_token(&self, refresh_token: &str) -> SinkResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .post_token_form(&params)
            .await
            .map_err(|e| e.recode(crate::SinkErrorCode::AuthUnavailable))?;

        debug!("Refreshed access token");
        Ok((response.access_token, response.expires_in))
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> SinkResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .post_token_form(&params)
            .await
            .map_err(|e| e.recode(crate::SinkErrorCode::AuthDenied))?;

        info!("Obtained OAuth tokens");
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            scopes.to_vec(),
        ))
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> SinkResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                SinkError::network(format!("token request failed: {e}")).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SinkError::network(format!("failed to read token response: {e}")).with_source(e)
        })?;

        if !status.is_success() {
            return Err(SinkError::api(format!(
                "token endpoint refused request ({status}): {body}"
            ))
            .with_status(status.as_u16()));
        }

        serde_json::from_str(&body).map_err(|e| {
            SinkError::invalid_response(format!("invalid token response: {e}")).with_source(e)
        })
    }
}

fn bind_loopback_server(port_range: (u16, u16)) -> SinkResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            debug!(port, "Bound loopback listener");
            return Ok((listener, port));
        }
    }
    Err(SinkError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Blocks until the redirect arrives or `timeout` elapses.
fn wait_for_callback(listener: TcpListener, timeout: Duration) -> SinkResult<(String, String)> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Some(result) = handle_callback(stream) {
                        let _ = tx.send(result);
                        return;
                    }
                }
                Err(e) => error!(error = %e, "Failed to accept callback connection"),
            }
        }
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SinkError::auth_denied(
            "timed out waiting for the authorization redirect",
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(SinkError::internal("callback listener stopped"))
        }
    }
}

/// Parses one HTTP request on the loopback listener.
///
/// Returns `None` for requests that are not the redirect (favicon etc.).
fn handle_callback(mut stream: TcpStream) -> Option<SinkResult<(String, String)>> {
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line).ok()?;

    let result = parse_callback_request(&request_line)?;

    let response = match result {
        Ok(_) => {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
             <html><body><h1>JobFlow is authorized</h1>\
             <p>You can close this window.</p></body></html>"
        }
        Err(_) => {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
             <html><body><h1>Authorization failed</h1>\
             <p>You can close this window.</p></body></html>"
        }
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Some(result)
}

/// Extracts `(code, state)` from a `GET /callback?...` request line.
fn parse_callback_request(request_line: &str) -> Option<SinkResult<(String, String)>> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    if !target.starts_with("/callback") {
        return None;
    }

    let url = Url::parse(&format!("http://127.0.0.1{target}")).ok()?;
    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = denied {
        return Some(Err(SinkError::auth_denied(format!(
            "authorization denied: {reason}"
        ))));
    }
    Some(match code {
        Some(code) => Ok((code, state.unwrap_or_default())),
        None => Err(SinkError::auth_denied(
            "missing authorization code in redirect",
        )),
    })
}

/// PKCE parameters (RFC 7636) plus the CSRF state.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent page URL, requesting offline access.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        let params = [
            ("client_id", client_id.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("scope", scopes.join(" ")),
            ("code_challenge", self.challenge.clone()),
            ("code_challenge_method", "S256".to_string()),
            ("state", self.state.clone()),
            ("access_type", "offline".to_string()),
            ("prompt", "consent".to_string()),
        ];
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{GOOGLE_AUTH_URL}?{query}")
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SinkErrorCode;

    #[test]
    fn verifier_is_43_chars() {
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        let challenge = PkceFlow::compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn flows_are_random() {
        let a = PkceFlow::new();
        let b = PkceFlow::new();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn auth_url_requests_offline_sheets_access() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            "jobflow.apps.googleusercontent.com",
            "http://127.0.0.1:8080/callback",
            &["https://www.googleapis.com/auth/spreadsheets".to_string()],
        );

        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8080/callback");
        assert_eq!(pairs["scope"], "https://www.googleapis.com/auth/spreadsheets");
        assert_eq!(pairs["code_challenge"], flow.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], flow.state);
        assert_eq!(pairs["access_type"], "offline");
    }

    #[test]
    fn callback_with_code() {
        let (code, state) =
            parse_callback_request("GET /callback?code=4%2Fabc&state=xyz HTTP/1.1\r\n")
                .unwrap()
                .unwrap();
        assert_eq!(code, "4/abc");
        assert_eq!(state, "xyz");
    }

    #[test]
    fn callback_with_error_is_denied() {
        let err = parse_callback_request("GET /callback?error=access_denied HTTP/1.1\r\n")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), SinkErrorCode::AuthDenied);
        assert!(err.message().contains("access_denied"));
    }

    #[test]
    fn unrelated_requests_are_ignored() {
        assert!(parse_callback_request("GET /favicon.ico HTTP/1.1\r\n").is_none());
        assert!(parse_callback_request("POST /callback HTTP/1.1\r\n").is_none());
        assert!(parse_callback_request("").is_none());
    }

    #[test]
    fn loopback_port_in_range() {
        let (_listener, port) = bind_loopback_server((0, 0)).unwrap();
        assert_eq!(port, 0);
    }
}

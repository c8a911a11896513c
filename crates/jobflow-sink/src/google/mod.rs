//! Google identity backend.
//!
//! Users bring their own OAuth client (Google requires a registered
//! application). `jobflow auth google` runs the PKCE consent flow once;
//! afterwards the daemon refreshes the access token silently from the stored
//! refresh token.

mod config;
mod identity;
mod oauth;
mod tokens;

pub use config::{GoogleAuthConfig, OAuthCredentials};
pub use identity::GoogleIdentity;
pub use oauth::{OAuthClient, PkceFlow};
pub use tokens::{TokenInfo, TokenStorage};

//! CLI, socket client and daemon wiring
//!
//! This crate provides the `jobflow` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use socket::SocketClient;

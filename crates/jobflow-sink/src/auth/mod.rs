//! Bearer token acquisition.
//!
//! [`TokenProvider`] caches one token and delegates to an
//! [`IdentityBackend`] when it has none. The Google backend lives in
//! [`crate::google`].

mod backend;
mod provider;

pub use backend::IdentityBackend;
pub use provider::TokenProvider;

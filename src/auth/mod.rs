//! Spotify OAuth (authorization code + PKCE) and token bookkeeping.

pub mod callback;
pub mod manager;
pub mod pkce;
pub mod store;

pub use manager::CredentialManager;
pub use store::CredentialStore;

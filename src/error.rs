//! Error types for the token and playback layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The PKCE verifier is gone; the login flow has to start over.
    #[error("PKCE verifier missing, run `landscape login` again")]
    MissingVerifier,

    /// No usable access token and nothing to refresh it with.
    #[error("not logged in, run `landscape login`")]
    Unauthenticated,

    /// A 401 could not be recovered by refreshing. Credentials have been cleared.
    #[error("session expired, run `landscape login` again")]
    SessionExpired,

    /// Non-2xx from the playback or lyrics API.
    #[error("{endpoint} returned HTTP {status}")]
    Upstream { endpoint: String, status: u16 },

    /// The request never produced a response.
    #[error("network failure: {0}")]
    Network(String),

    #[error("decode {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether the session can't recover without a new login.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SessionExpired | Error::Unauthenticated | Error::MissingVerifier
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

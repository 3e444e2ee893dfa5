//! Error types for veritree

use thiserror::Error;

/// Result type alias for veritree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in veritree operations
///
/// A missing key is not an error; `Get` reports it as a
/// [`GetOutcome::NotFound`](crate::protocol::GetOutcome) terminal outcome.
#[derive(Error, Debug)]
pub enum Error {
    /// A proof failed to fold to the expected root, a response arrived
    /// out of order or duplicated, or a path does not follow the key's
    /// path through the tree. Fatal to the operation; retrying does not
    /// change server honesty.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Key parsing, signing, or signature verification failed. Fatal to
    /// the operation that required it; the prior trusted root remains
    /// authoritative.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The server was unreachable or the exchange broke down. Retryable
    /// by the caller from a fresh root snapshot; never retried by the
    /// core, since a retry must not mix proof material across epochs.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("invalid hash: {0}")]
    InvalidHash(String),
}

impl Error {
    /// Whether the caller may retry the operation from a fresh snapshot
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

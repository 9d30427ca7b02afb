//! Crate error taxonomy
//!
//! Validation failures abort an operation before it touches the backend.
//! Backend failures are normalized into a single opaque variant carrying the
//! driver's message text; callers cannot distinguish backend error classes.

use thiserror::Error;

/// Errors surfaced by the mapping layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Insert was attempted with no properties set.
    #[error("invalid request (empty values)")]
    EmptyValues,

    /// Update computed an empty changed-field diff.
    #[error("invalid request (no changes)")]
    NoChanges,

    /// Update or delete could not find a usable identity value.
    #[error("invalid request (no condition)")]
    MissingIdentity,

    /// Any failure returned by the connection/query execution path.
    /// Structured driver detail is discarded; only the message survives.
    #[error("{message}")]
    Backend { message: String },

    /// A schema descriptor is missing metadata an operation requires.
    /// Signals a programming error, never expected at runtime.
    #[error("[mapper] `{0}` metadata missing")]
    Contract(&'static str),
}

impl Error {
    /// Wrap a backend failure, keeping only its message text.
    pub fn backend(source: impl std::fmt::Display) -> Self {
        Error::Backend {
            message: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

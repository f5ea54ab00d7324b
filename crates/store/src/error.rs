//! Error types for the store crate.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur against the document storage API.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No credential is available; the caller must authenticate first.
    #[error("no credential available; authentication required")]
    MissingCredential,

    /// The credential was rejected. The local credential has been
    /// invalidated and the user must re-authenticate.
    #[error("credential rejected; re-authentication required")]
    Unauthorized,

    /// Document does not exist.
    #[error("document not found: {0}")]
    NotFound(i64),

    /// The API answered with a non-success status.
    #[error("storage API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure reaching the API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

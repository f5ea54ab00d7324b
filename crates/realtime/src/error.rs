//! Error types for the realtime engine.

use store::StoreError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the channel transport.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Opening the channel failed before it was established.
    #[error("failed to open channel: {0}")]
    Connect(String),

    /// The channel endpoint address could not be built.
    #[error("invalid channel endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Errors that can occur in a sync session.
///
/// Transport-level failures never surface here directly; the connection
/// manager converts them into state transitions and status signals. What
/// remains are the conditions a caller can act on.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No credential was available at connect time. Fatal to that
    /// attempt; no retry is made.
    #[error("no credential available; cannot connect")]
    CredentialMissing,

    /// The channel could not be opened.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A durable save failed. Surfaced as a status, never retried
    /// automatically.
    #[error("persistence call failed: {0}")]
    Persistence(#[from] StoreError),

    /// All automatic reconnect attempts are exhausted; the caller must
    /// invoke connect again.
    #[error("reconnect attempts exhausted")]
    MaxReconnectExceeded,

    /// A save is already in flight; at most one persistence call may be
    /// outstanding at a time.
    #[error("a save is already in flight")]
    SaveInFlight,

    /// The channel is not open.
    #[error("channel is not open")]
    NotConnected,

    /// The session actor has shut down.
    #[error("session has shut down")]
    SessionClosed,
}

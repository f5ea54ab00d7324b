//! Error types for the protocol crate.

use thiserror::Error;

use crate::kind::MessageKind;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
///
/// A `ProtocolError` is scoped to a single frame: the session logs it and
/// drops the frame, it is never fatal to the channel.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame was not a structurally valid envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// The envelope carried no payload but the kind requires one.
    #[error("missing payload for {0} message")]
    MissingPayload(MessageKind),

    /// The payload did not match the shape expected for the kind.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: MessageKind,
        source: serde_json::Error,
    },
}

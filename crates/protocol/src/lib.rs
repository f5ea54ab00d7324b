//! Wire protocol for the realtime document sync channel.
//!
//! Every frame on the document channel is a JSON-encoded [`Envelope`]
//! tagged with a [`MessageKind`]. The envelope layer is deliberately
//! shallow: payloads stay opaque (`serde_json::Value`) so that unknown
//! kinds pass through untouched, and typed views ([`EditPayload`],
//! [`CursorPayload`]) are extracted only by the subscribers that care.
//!
//! # Modules
//!
//! - `kind`: the closed message-kind vocabulary with an escape hatch for
//!   unrecognized tags
//! - `envelope`: the frame envelope and typed payload views
//! - `error`: error types for the protocol crate

pub mod envelope;
pub mod error;
pub mod kind;

pub use envelope::{CursorPayload, EditPayload, Envelope};
pub use error::{ProtocolError, ProtocolResult};
pub use kind::MessageKind;

//! Realtime synchronization engine for collaborative document editing.
//!
//! This crate keeps one shared document's editor state consistent across
//! concurrently connected clients, layered atop the durable storage API
//! in the `store` crate. The conflict model is deliberately simple:
//! whole-document last-write-wins replacement, no operational transforms
//! and no merging.
//!
//! # Architecture
//!
//! A [`Session`] is created per open editor. Its actor task owns every
//! piece of mutable engine state and multiplexes commands, inbound
//! frames, timer deadlines and save completions through one `select!`
//! loop — the single-writer discipline that keeps the three independent
//! timers (edit debounce, autosave, reconnect backoff) free of races.
//!
//! # Modules
//!
//! - `config`: session timing and endpoint configuration
//! - `transport`: the channel seam and its WebSocket implementation
//! - `connection`: channel lifecycle with exponential reconnect backoff
//! - `dispatcher`: typed publish/subscribe over inbound frames
//! - `edit_sync`: debounced broadcast, last-write-wins apply, self-echo
//!   suppression, presence activity
//! - `autosave`: unsaved-state tracking and durable-save scheduling
//! - `session`: the actor tying it all together
//! - `error`: error types for the engine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use realtime::{Session, SyncConfig, WsConnector};
//! use store::{Credential, HttpDocumentStore, MemoryCredentials};
//!
//! # async fn activate() -> realtime::SyncResult<()> {
//! let credentials = Arc::new(MemoryCredentials::with_credential(
//!     Credential::new("jwt", 3, "alice"),
//! ));
//! let store = Arc::new(HttpDocumentStore::new(
//!     "http://localhost:8080",
//!     Arc::clone(&credentials),
//! ));
//!
//! let (session, document, mut events) = Session::activate(
//!     SyncConfig::default(),
//!     WsConnector::new(),
//!     store,
//!     credentials,
//!     7,
//! )
//! .await?;
//!
//! session.edit_content(format!("{}!", document.content))?;
//! # Ok(())
//! # }
//! ```

pub mod autosave;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod edit_sync;
pub mod error;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use autosave::{AutosaveCoordinator, SaveStatus, SaveTrigger};
pub use config::SyncConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::{EventDispatcher, Subscription};
pub use edit_sync::{EditSyncPolicy, PresenceEntry, PresenceEvent, RemoteOutcome};
pub use error::{ChannelError, SyncError, SyncResult};
pub use session::{Session, SessionEvent, SessionEvents};
pub use transport::{
    Channel, ChannelEvent, CloseReason, Connector, ScriptedConnector, ScriptedLink, WsConnector,
};

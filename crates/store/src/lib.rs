//! Durable document storage for the sync engine.
//!
//! The realtime engine treats persistence as an external collaborator
//! behind the [`DocumentStore`] trait: fetch a document by id, create one,
//! replace title and content wholesale, or delete. Every call carries a
//! bearer credential obtained from a [`CredentialProvider`]; a rejected
//! credential is invalidated so the embedding application can force
//! re-authentication.
//!
//! # Modules
//!
//! - `document`: the stored document record and its draft form
//! - `credentials`: bearer credential plus local identity, and providers
//! - `storage`: the `DocumentStore` trait
//! - `http`: HTTP implementation against the document API
//! - `memory`: in-memory implementation for tests and embedding

pub mod credentials;
pub mod document;
pub mod error;
pub mod http;
pub mod memory;
pub mod storage;

pub use credentials::{Credential, CredentialProvider, MemoryCredentials};
pub use document::{Document, DocumentDraft};
pub use error::{StoreError, StoreResult};
pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;
pub use storage::DocumentStore;

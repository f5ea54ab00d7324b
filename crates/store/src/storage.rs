//! The document storage trait.

use crate::document::{Document, DocumentDraft};
use crate::error::StoreResult;

/// Backend-agnostic access to durable document storage.
///
/// Implementations talk to the document API ([`crate::HttpDocumentStore`])
/// or hold documents in memory for tests ([`crate::MemoryDocumentStore`]).
/// Methods take `&self`; implementations use internal mutability where
/// they need it.
#[trait_variant::make(Send)]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn fetch(&self, id: i64) -> StoreResult<Document>;

    /// Create a new document.
    async fn create(&self, draft: &DocumentDraft) -> StoreResult<Document>;

    /// Replace a document's title and content wholesale.
    async fn replace(&self, id: i64, draft: &DocumentDraft) -> StoreResult<Document>;

    /// Delete a document.
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

//! In-memory document storage for tests and embedding.
//!
//! Besides plain CRUD the memory store offers two failure hooks used by
//! the sync race tests: `fail_next_replace` makes exactly one replace
//! return an API error, and `set_replace_delay` holds each replace for a
//! duration before completing (driven deterministically under paused
//! test time).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::document::{Document, DocumentDraft};
use crate::error::{StoreError, StoreResult};
use crate::storage::DocumentStore;

/// Document storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<i64, Document>>,
    next_id: AtomicI64,
    replace_count: AtomicU64,
    fail_next_replace: AtomicBool,
    replace_delay: Mutex<Option<Duration>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Insert a document directly, bypassing the API surface.
    pub fn seed(&self, document: Document) {
        let mut documents = self.documents.lock().unwrap();
        let next = document.id + 1;
        if next > self.next_id.load(Ordering::SeqCst) {
            self.next_id.store(next, Ordering::SeqCst);
        }
        documents.insert(document.id, document);
    }

    /// Seed a document with the given id, title and content.
    pub fn seed_with(&self, id: i64, title: &str, content: &str) {
        let now = Utc::now();
        self.seed(Document {
            id,
            title: title.to_string(),
            content: content.to_string(),
            owner_id: 0,
            created_at: now,
            updated_at: now,
        });
    }

    /// Number of `replace` calls observed.
    pub fn replace_count(&self) -> u64 {
        self.replace_count.load(Ordering::SeqCst)
    }

    /// Make the next `replace` call fail with an API error.
    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    /// Hold every `replace` call for `delay` before completing.
    pub fn set_replace_delay(&self, delay: Duration) {
        *self.replace_delay.lock().unwrap() = Some(delay);
    }

    /// Remove the replace delay.
    pub fn clear_replace_delay(&self) {
        *self.replace_delay.lock().unwrap() = None;
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, id: i64) -> StoreResult<Document> {
        let documents = self.documents.lock().unwrap();
        documents.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, draft: &DocumentDraft) -> StoreResult<Document> {
        let now = Utc::now();
        let document = Document {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            title: draft.title.clone(),
            content: draft.content.clone(),
            owner_id: 0,
            created_at: now,
            updated_at: now,
        };
        self.documents
            .lock()
            .unwrap()
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn replace(&self, id: i64, draft: &DocumentDraft) -> StoreResult<Document> {
        self.replace_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.replace_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 500,
                message: "injected save failure".to_string(),
            });
        }

        let mut documents = self.documents.lock().unwrap();
        let document = documents.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        document.title = draft.title.clone();
        document.content = draft.content.clone();
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        documents
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

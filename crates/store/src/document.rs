//! The stored document record and its draft form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document as the storage API returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title and content for a create or full-replace update.
///
/// Updates are always whole-document replacements; the API has no
/// partial-update form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub title: String,
    pub content: String,
}

impl DocumentDraft {
    /// Build a draft from title and content.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

impl From<&Document> for DocumentDraft {
    fn from(document: &Document) -> Self {
        Self {
            title: document.title.clone(),
            content: document.content.clone(),
        }
    }
}

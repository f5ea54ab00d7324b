//! HTTP implementation of the document storage trait.
//!
//! Talks to the document API under `{base}/api/documents`. Every request
//! carries the bearer credential; a 401 response invalidates the local
//! credential through the provider before surfacing as
//! [`StoreError::Unauthorized`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::credentials::{Credential, CredentialProvider};
use crate::document::{Document, DocumentDraft};
use crate::error::{StoreError, StoreResult};
use crate::storage::DocumentStore;

/// Default request timeout. Persistence calls carry no engine-side
/// timeout, so the client-level timeout is the only bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body shape of the document API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Document storage backed by the HTTP document API.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore<C> {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<C>,
}

impl<C: CredentialProvider> HttpDocumentStore<C> {
    /// Create a store for the given API base URL (e.g.
    /// `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>, credentials: Arc<C>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            http,
            base_url: base_url.into(),
            credentials,
        }
    }

    /// Replace the underlying HTTP client, e.g. to change the timeout.
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn endpoint(&self, id: Option<i64>) -> String {
        match id {
            Some(id) => format!("{}/api/documents/{}", self.base_url, id),
            None => format!("{}/api/documents", self.base_url),
        }
    }

    fn require_credential(&self) -> StoreResult<Credential> {
        self.credentials
            .credential()
            .ok_or(StoreError::MissingCredential)
    }

    /// Map a non-success response to the store error taxonomy.
    async fn fail(&self, response: reqwest::Response, id: Option<i64>) -> StoreError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate();
            return StoreError::Unauthorized;
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return StoreError::NotFound(id);
            }
        }
        let message = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        StoreError::Api {
            status: status.as_u16(),
            message,
        }
    }

    async fn read_document(
        &self,
        response: reqwest::Response,
        id: Option<i64>,
    ) -> StoreResult<Document> {
        if !response.status().is_success() {
            return Err(self.fail(response, id).await);
        }
        Ok(response.json::<Document>().await?)
    }
}

impl<C: CredentialProvider> DocumentStore for HttpDocumentStore<C> {
    async fn fetch(&self, id: i64) -> StoreResult<Document> {
        let credential = self.require_credential()?;
        let response = self
            .http
            .get(self.endpoint(Some(id)))
            .bearer_auth(&credential.token)
            .send()
            .await?;
        self.read_document(response, Some(id)).await
    }

    async fn create(&self, draft: &DocumentDraft) -> StoreResult<Document> {
        let credential = self.require_credential()?;
        let response = self
            .http
            .post(self.endpoint(None))
            .bearer_auth(&credential.token)
            .json(draft)
            .send()
            .await?;
        self.read_document(response, None).await
    }

    async fn replace(&self, id: i64, draft: &DocumentDraft) -> StoreResult<Document> {
        let credential = self.require_credential()?;
        tracing::debug!(document_id = id, "replacing document title and content");
        let response = self
            .http
            .put(self.endpoint(Some(id)))
            .bearer_auth(&credential.token)
            .json(draft)
            .send()
            .await?;
        self.read_document(response, Some(id)).await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let credential = self.require_credential()?;
        let response = self
            .http
            .delete(self.endpoint(Some(id)))
            .bearer_auth(&credential.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.fail(response, Some(id)).await);
        }
        Ok(())
    }
}

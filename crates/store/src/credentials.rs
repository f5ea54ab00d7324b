//! Bearer credentials and the provider seam.
//!
//! Credential acquisition (login, refresh) belongs to the embedding
//! application; the engine only needs to read the current credential and
//! to invalidate it when the API rejects it.

use std::sync::Mutex;

/// A bearer token together with the authenticated local identity.
///
/// The identity fields are what the auth provider reported at login. They
/// are used locally (self-echo suppression needs the user id) but never
/// asserted to the server, which stamps identity on relay itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub user_id: i64,
    pub username: String,
}

impl Credential {
    /// Build a credential.
    pub fn new(token: impl Into<String>, user_id: i64, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id,
            username: username.into(),
        }
    }
}

/// Source of the current bearer credential.
///
/// `credential()` returning `None` means the user is not authenticated;
/// connection attempts fail synchronously in that case.
pub trait CredentialProvider: Send + Sync {
    /// The current credential, if any.
    fn credential(&self) -> Option<Credential>;

    /// Drop the current credential after the API rejected it, forcing
    /// re-authentication.
    fn invalidate(&self);
}

/// In-memory credential holder for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    current: Mutex<Option<Credential>>,
}

impl MemoryCredentials {
    /// Create an empty holder (unauthenticated).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder primed with a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: Mutex::new(Some(credential)),
        }
    }

    /// Store a credential (e.g. after login).
    pub fn set(&self, credential: Credential) {
        *self.current.lock().unwrap() = Some(credential);
    }
}

impl CredentialProvider for MemoryCredentials {
    fn credential(&self) -> Option<Credential> {
        self.current.lock().unwrap().clone()
    }

    fn invalidate(&self) {
        tracing::warn!("credential invalidated; re-authentication required");
        *self.current.lock().unwrap() = None;
    }
}

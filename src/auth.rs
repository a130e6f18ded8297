//! Connection credentials for the realtime channel.
//!
//! The bearer token is owned by the application's auth layer and persisted
//! locally; this module only reads it. A [`TokenStore`] is consulted every
//! time a connection is built, so a refreshed token is picked up by the next
//! `reconnect()`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{CampusLinkError, Result};
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::http::Request;

/// Authentication credentials attached when the channel connects.
///
/// # Examples
///
/// ```rust
/// use campus_link::AuthProvider;
///
/// let auth = AuthProvider::jwt_token("eyJhbGc...".to_string());
/// assert!(auth.is_authenticated());
///
/// // No token persisted: connect unauthenticated
/// assert!(!AuthProvider::none().is_authenticated());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    /// Bearer token authentication
    JwtToken(String),

    /// No authentication
    None,
}

impl AuthProvider {
    pub fn jwt_token(token: String) -> Self {
        Self::JwtToken(token)
    }

    pub fn none() -> Self {
        Self::None
    }

    /// Build from whatever the token store currently holds.
    pub fn from_store(store: &dyn TokenStore) -> Self {
        match store.access_token() {
            Some(token) if !token.trim().is_empty() => Self::JwtToken(token),
            _ => Self::None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Attach `Authorization: Bearer <token>` to a WebSocket upgrade request.
    pub fn apply_to_ws_request(&self, request: &mut Request<()>) -> Result<()> {
        match self {
            Self::JwtToken(token) => {
                let value = format!("Bearer {}", token);
                let header_value = HeaderValue::from_str(&value).map_err(|e| {
                    CampusLinkError::AuthenticationError(format!(
                        "Invalid token for Authorization header: {}",
                        e
                    ))
                })?;
                request.headers_mut().insert(AUTHORIZATION, header_value);
            },
            Self::None => {},
        }
        Ok(())
    }
}

/// Read-only access to the persisted bearer token.
///
/// Implementations might read a file, the OS keychain or an in-process
/// session object. Returning `None` means "connect unauthenticated".
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// In-memory token store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the stored token (e.g. after a login or refresh).
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Deserialize)]
struct PersistedSession {
    token: Option<String>,
}

/// Reads the token from a JSON session file: `{"token": "..."}`.
///
/// The file is re-read on every call. A missing or malformed file yields
/// `None`, so the channel connects unauthenticated.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_token(&self) -> Result<Option<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session: PersistedSession = serde_json::from_str(&content)?;
        Ok(session.token)
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        match self.read_token() {
            Ok(token) => token,
            Err(e) => {
                log::warn!(
                    "[campus-link] Ignoring unreadable session file {}: {}",
                    self.path.display(),
                    e
                );
                None
            },
        }
    }
}

//! Credentials and cached session state.
//!
//! Both live in a [`SecretStore`] under fixed keys:
//!
//! - `credentials`: `{"username": "...", "password": "..."}` (read-only)
//! - `session-cache`: `{"session_token", "streamer_token", "dxlink_url"}`
//!
//! # Security
//!
//! - Passwords and tokens are NEVER logged; `Debug` output is redacted
//! - Token strings are zeroized on drop

use crate::error::{Result, TastytradeError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use spreadbot_core::SecretStore;
use std::sync::Arc;
use zeroize::Zeroize;

// =============================================================================
// Constants
// =============================================================================

/// Secret store key holding login credentials.
pub const CREDENTIALS_KEY: &str = "credentials";

/// Secret store key holding the cached session.
pub const SESSION_CACHE_KEY: &str = "session-cache";

// =============================================================================
// Credentials
// =============================================================================

/// Long-lived login credentials.
pub struct Credentials {
    username: String,
    password: SecretString,
}

#[derive(Deserialize)]
struct RawCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Parses the JSON form stored under [`CREDENTIALS_KEY`].
    ///
    /// # Errors
    /// Returns error if the document is not valid credentials JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut raw: RawCredentials = serde_json::from_str(text)
            .map_err(|e| TastytradeError::CredentialStore(format!("malformed credentials: {e}")))?;
        let creds = Self::new(raw.username.clone(), raw.password.clone());
        raw.password.zeroize();
        Ok(creds)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

// =============================================================================
// SessionState
// =============================================================================

/// Authenticated session tokens and the streaming endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_token: String,
    pub streamer_token: String,
    pub dxlink_url: String,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session_token", &"[REDACTED]")
            .field("streamer_token", &"[REDACTED]")
            .field("dxlink_url", &self.dxlink_url)
            .finish()
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.session_token.zeroize();
        self.streamer_token.zeroize();
    }
}

impl SessionState {
    /// Returns true when a session token is present.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.session_token.is_empty()
    }
}

// =============================================================================
// CredentialStore
// =============================================================================

/// Typed access to credentials and the session cache in a [`SecretStore`].
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Loads login credentials.
    ///
    /// # Errors
    /// Returns [`TastytradeError::CredentialStore`] if the store fails or the
    /// key is missing. Callers treat this as fatal.
    pub async fn load_credentials(&self) -> Result<Credentials> {
        let text = self
            .store
            .get(CREDENTIALS_KEY)
            .await
            .map_err(|e| TastytradeError::CredentialStore(format!("{e:#}")))?
            .ok_or_else(|| {
                TastytradeError::CredentialStore(format!("secret {CREDENTIALS_KEY:?} not found"))
            })?;
        Credentials::from_json(&text)
    }

    /// Loads the cached session, if one exists.
    ///
    /// A cache entry that fails to parse is treated as absent.
    ///
    /// # Errors
    /// Returns error if the secret store itself fails.
    pub async fn load_session(&self) -> Result<Option<SessionState>> {
        let Some(text) = self
            .store
            .get(SESSION_CACHE_KEY)
            .await
            .map_err(|e| TastytradeError::CredentialStore(format!("{e:#}")))?
        else {
            tracing::debug!("no cached session found");
            return Ok(None);
        };

        match serde_json::from_str::<SessionState>(&text) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session cache");
                Ok(None)
            }
        }
    }

    /// Writes the session cache.
    ///
    /// # Errors
    /// Returns error if the secret store rejects the write.
    pub async fn save_session(&self, state: &SessionState) -> Result<()> {
        let text = serde_json::to_string(state)?;
        self.store
            .put(SESSION_CACHE_KEY, &text)
            .await
            .map_err(|e| TastytradeError::CredentialStore(format!("{e:#}")))
    }
}

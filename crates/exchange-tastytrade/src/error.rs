//! Error types for the tastytrade integration.
//!
//! Provides typed errors for authentication, API communication, order
//! rejection, and streaming failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the `error.errors` list in a tastytrade error body.
///
/// Entries carry either a `code` with a `message`, or a free-text `reason`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ApiErrorDetail {
    /// Operator-facing text: the message for coded errors, otherwise the reason.
    #[must_use]
    pub fn text(&self) -> &str {
        let preferred = if self.code.is_some() {
            self.message.as_deref().or(self.reason.as_deref())
        } else {
            self.reason.as_deref().or(self.message.as_deref())
        };
        preferred.unwrap_or("")
    }
}

/// Errors that can occur when interacting with tastytrade.
#[derive(Debug, Error)]
pub enum TastytradeError {
    /// Login or session validation failed.
    #[error("authentication error: {status_code} - {message}")]
    Authentication {
        /// HTTP status code (0 when no response was received).
        status_code: u16,
        /// Response body or failure description.
        message: String,
    },

    /// Secret store could not be read or written.
    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// API request failed with an unstructured body.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// API request failed with a structured error body.
    #[error("request rejected: {status_code} - {message}")]
    Rejected {
        /// HTTP status code.
        status_code: u16,
        /// Top-level `error.message`.
        message: String,
        /// Nested `error.errors` entries.
        errors: Vec<ApiErrorDetail>,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Streaming feed failure.
    #[error("stream error: {0}")]
    Stream(String),

    /// Identifier failed validation before being placed in a URL.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Option chain not found for a symbol.
    #[error("option chain not found: {symbol}")]
    ChainNotFound {
        /// The underlying symbol requested.
        symbol: String,
    },

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The order ID that was not found.
        order_id: String,
    },

    /// No tradeable account on the login.
    #[error("no open account available")]
    NoAccount,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TastytradeError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(status_code: u16, message: impl Into<String>) -> Self {
        Self::Authentication {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a structured rejection error.
    pub fn rejected(
        status_code: u16,
        message: impl Into<String>,
        errors: Vec<ApiErrorDetail>,
    ) -> Self {
        Self::Rejected {
            status_code,
            message: message.into(),
            errors,
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Creates a chain not found error.
    pub fn chain_not_found(symbol: impl Into<String>) -> Self {
        Self::ChainNotFound {
            symbol: symbol.into(),
        }
    }

    /// Creates an order not found error.
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound {
            order_id: order_id.into(),
        }
    }

    /// HTTP status attached to the error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { status_code, .. }
            | Self::Api { status_code, .. }
            | Self::Rejected { status_code, .. } => Some(*status_code),
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TastytradeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TastytradeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TastytradeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Stream(err.to_string())
    }
}

/// Result type alias for tastytrade operations.
pub type Result<T> = std::result::Result<T, TastytradeError>;

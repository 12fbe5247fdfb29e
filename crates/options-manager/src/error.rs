//! Error types for spread construction and execution.

use spreadbot_core::{EventKind, StreamEvent};
use spreadbot_tastytrade::{ApiErrorDetail, TastytradeError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while selecting, pricing, validating or recording a spread.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Credentials missing or login refused.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Fewer distinct instruments reported than required before the deadline.
    #[error("timed out waiting for {kind} events: got {} of {expected}", .partial.len())]
    AggregationTimeout {
        kind: EventKind,
        expected: usize,
        partial: HashMap<String, StreamEvent>,
    },

    /// Stream ended before enough instruments reported.
    #[error("{kind} stream closed after {} of {expected} events", .partial.len())]
    StreamClosed {
        kind: EventKind,
        expected: usize,
        partial: HashMap<String, StreamEvent>,
    },

    /// Market data stream failed.
    #[error("market data error: {0}")]
    MarketData(String),

    /// No strike at the requested price.
    #[error("no strike at {price} in expiration {expiration}")]
    StrikeNotFound {
        price: rust_decimal::Decimal,
        expiration: chrono::NaiveDate,
    },

    /// Chain, expiration or greeks did not yield a candidate option.
    #[error("no option found: {0}")]
    OptionNotFound(String),

    /// Dry-run returned structured errors.
    #[error("order rejected: {message}")]
    ValidationRejected {
        message: String,
        errors: Vec<ApiErrorDetail>,
    },

    /// Order parameters cannot form a valid order.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Instrument identifier could not be decoded.
    #[error(transparent)]
    Symbol(#[from] spreadbot_core::SymbolError),

    /// Tick size is zero or negative.
    #[error("invalid tick size: {0}")]
    InvalidTickSize(rust_decimal::Decimal),

    /// Record sink rejected a write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Brokerage call failed.
    #[error(transparent)]
    Broker(#[from] TastytradeError),
}

impl OptionsError {
    /// Creates an option-not-found error.
    pub fn option_not_found(message: impl Into<String>) -> Self {
        Self::OptionNotFound(message.into())
    }

    /// Creates an invalid-order error.
    pub fn invalid_order(message: impl Into<String>) -> Self {
        Self::InvalidOrder(message.into())
    }

    /// Converts broker errors, lifting authentication failures into their
    /// own variant. Structured rejections stay [`Self::Broker`].
    #[must_use]
    pub fn from_broker(err: TastytradeError) -> Self {
        match err {
            TastytradeError::Authentication { .. } | TastytradeError::CredentialStore(_) => {
                Self::Authentication(err.to_string())
            }
            other => Self::Broker(other),
        }
    }

    /// Like [`Self::from_broker`], but a structured rejection of a submitted
    /// order becomes [`Self::ValidationRejected`].
    #[must_use]
    pub fn from_order_submission(err: TastytradeError) -> Self {
        match err {
            TastytradeError::Rejected {
                message, errors, ..
            } => Self::ValidationRejected { message, errors },
            other => Self::from_broker(other),
        }
    }

    /// Operator-facing lines for a rejection: the top-level message, then
    /// each nested error's message (coded) or reason.
    #[must_use]
    pub fn rejection_lines(&self) -> Vec<String> {
        match self {
            Self::ValidationRejected { message, errors } => std::iter::once(message.clone())
                .chain(errors.iter().map(|e| e.text().to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Result type alias for options operations.
pub type Result<T> = std::result::Result<T, OptionsError>;

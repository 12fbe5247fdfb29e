//! tastytrade integration for options spread automation.
//!
//! This crate provides:
//! - REST client with rate limiting for sessions, accounts, option chains and orders
//! - Session management with a persisted token cache and single-flight renewal
//! - DXLink websocket streaming for greeks and quotes
//! - Data models for chains, order requests and order responses
//!
//! # Example
//!
//! ```ignore
//! use spreadbot_tastytrade::{CredentialStore, SessionManager, TastytradeClient, TastytradeClientConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TastytradeClient::new(TastytradeClientConfig::production())?;
//!     let store = CredentialStore::new(Arc::new(my_secret_store()));
//!
//!     // Reuses the cached session when the server still accepts it
//!     let session = SessionManager::connect(client, store).await?;
//!
//!     let chain = session.client().option_chain("SPX").await?;
//!     println!("{} expirations", chain.expirations.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! Credentials and the session cache are read from a
//! [`spreadbot_core::SecretStore`] under the keys `credentials` and
//! `session-cache`. The session token is sent verbatim as the
//! `Authorization` header.
//!
//! # API Endpoints
//!
//! - `POST /sessions` - Log in
//! - `POST /sessions/validate` - Validate the current token
//! - `GET /quote-streamer-tokens` - Streaming token and DXLink URL
//! - `GET /customers/me/accounts` - List accounts
//! - `GET /option-chains/{symbol}/nested` - Nested option chain
//! - `POST /accounts/{account}/orders/dry-run` - Validate an order
//! - `POST /accounts/{account}/orders` - Place an order
//! - `GET /accounts/{account}/orders/{id}` - Get order status

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod streamer;
pub mod types;

// Re-export main types for convenience
pub use auth::{CredentialStore, Credentials, SessionState, CREDENTIALS_KEY, SESSION_CACHE_KEY};
pub use client::{
    TastytradeClient, TastytradeClientConfig, TASTYTRADE_PROD_URL, TASTYTRADE_SANDBOX_URL,
};
pub use error::{ApiErrorDetail, Result, TastytradeError};
pub use session::SessionManager;
pub use streamer::{DxLinkConfig, DxLinkConnector, DxLinkStreamer};
pub use types::{
    Account, ApiMessage, BuyingPowerEffect, Expiration, FeeCalculation, InstrumentType, OptionChain,
    OrderAction, OrderLeg, OrderRequest, OrderResponse, OrderStatus, OrderType, PlacedLeg,
    PlacedOrder, PriceEffect, StreamerToken, Strike, TickSize, TimeInForce,
};

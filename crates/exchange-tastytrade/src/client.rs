//! tastytrade REST API client with rate limiting.
//!
//! Provides typed access to the session, account, option chain and order
//! endpoints with automatic rate limiting using the governor crate.
//!
//! The client carries the current session token in a shared slot so every
//! clone sees a renewed token as soon as [`TastytradeClient::set_session_token`]
//! returns.
//!
//! # Example
//!
//! ```ignore
//! use spreadbot_tastytrade::{TastytradeClient, TastytradeClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TastytradeClient::new(TastytradeClientConfig::sandbox())?;
//!     client.set_session_token(Some("token".to_string()));
//!
//!     let chain = client.option_chain("SPX").await?;
//!     println!("{} expirations", chain.expirations.len());
//!
//!     Ok(())
//! }
//! ```

use crate::auth::Credentials;
use crate::error::{Result, TastytradeError};
use crate::types::{
    Account, ApiErrorBody, Expiration, OptionChain, OrderRequest, OrderResponse, PlacedOrder,
    StreamerToken, Strike, TickSize,
};
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// tastytrade production API base URL.
pub const TASTYTRADE_PROD_URL: &str = "https://api.tastyworks.com";

/// tastytrade certification (sandbox) API base URL.
pub const TASTYTRADE_SANDBOX_URL: &str = "https://api.cert.tastyworks.com";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the tastytrade client.
#[derive(Debug, Clone)]
pub struct TastytradeClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Requests per second limit.
    pub requests_per_second: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TastytradeClientConfig {
    fn default() -> Self {
        Self {
            base_url: TASTYTRADE_PROD_URL.to_string(),
            requests_per_second: nonzero!(5u32),
            timeout_secs: 30,
        }
    }
}

impl TastytradeClientConfig {
    /// Creates a configuration for production.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Creates a configuration for the certification environment.
    #[must_use]
    pub fn sandbox() -> Self {
        Self {
            base_url: TASTYTRADE_SANDBOX_URL.to_string(),
            ..Default::default()
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// API Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ItemsData<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawLogin {
    session_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct LoginBody<'a> {
    login: &'a str,
    password: &'a str,
    remember_me: bool,
}

#[derive(Debug, Deserialize)]
struct RawAccountItem {
    account: Account,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawNestedChain {
    underlying_symbol: String,
    #[serde(default)]
    tick_sizes: Vec<TickSize>,
    #[serde(default)]
    expirations: Vec<RawExpiration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawExpiration {
    expiration_date: NaiveDate,
    days_to_expiration: i64,
    #[serde(default)]
    strikes: Vec<RawStrike>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawStrike {
    strike_price: Decimal,
    call: String,
    put: String,
    call_streamer_symbol: String,
    put_streamer_symbol: String,
}

impl From<RawStrike> for Strike {
    fn from(raw: RawStrike) -> Self {
        Self {
            price: raw.strike_price,
            call: raw.call,
            put: raw.put,
            call_streamer_symbol: raw.call_streamer_symbol,
            put_streamer_symbol: raw.put_streamer_symbol,
        }
    }
}

impl From<RawExpiration> for Expiration {
    fn from(raw: RawExpiration) -> Self {
        Self {
            date: raw.expiration_date,
            days_to_expiration: raw.days_to_expiration,
            strikes: raw.strikes.into_iter().map(Strike::from).collect(),
        }
    }
}

impl From<RawNestedChain> for OptionChain {
    fn from(raw: RawNestedChain) -> Self {
        OptionChain::new(
            raw.underlying_symbol,
            raw.tick_sizes,
            raw.expirations.into_iter().map(Expiration::from).collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawOrderData {
    order: PlacedOrder,
}

// =============================================================================
// TastytradeClient
// =============================================================================

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// tastytrade REST API client.
///
/// Cheap to clone; clones share the HTTP connection pool, the rate limiter,
/// and the session token slot.
#[derive(Clone)]
pub struct TastytradeClient {
    /// Configuration.
    config: TastytradeClientConfig,

    /// HTTP client.
    http: Client,

    /// Rate limiter.
    rate_limiter: Arc<DirectRateLimiter>,

    /// Session token sent as the `Authorization` header.
    token: Arc<RwLock<Option<SecretString>>>,
}

impl std::fmt::Debug for TastytradeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TastytradeClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_second", &self.config.requests_per_second)
            .field("authenticated", &self.token.read().is_some())
            .finish_non_exhaustive()
    }
}

impl TastytradeClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: TastytradeClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("spreadbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TastytradeError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(config.requests_per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Replaces the session token used by this client and all its clones.
    pub fn set_session_token(&self, token: Option<String>) {
        *self.token.write() = token.map(SecretString::from);
    }

    /// Returns true if a session token is installed.
    #[must_use]
    pub fn has_session_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Validates an identifier (account number, symbol) placed in a URL path.
    ///
    /// Valid identifiers contain only alphanumeric characters, hyphens, and
    /// underscores. Examples: "5WT00001", "SPX".
    fn validate_identifier(id: &str) -> Result<&str> {
        if id.contains("..") || id.contains('/') || id.contains('\\') {
            return Err(TastytradeError::InvalidIdentifier(format!(
                "contains forbidden characters: {id}"
            )));
        }

        if id.is_empty() {
            return Err(TastytradeError::InvalidIdentifier(
                "identifier cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TastytradeError::InvalidIdentifier(format!(
                "must contain only alphanumeric, hyphen, or underscore: {id}"
            )));
        }

        if id.len() > 64 {
            return Err(TastytradeError::InvalidIdentifier(format!(
                "exceeds maximum length of 64: {}",
                id.len()
            )));
        }

        Ok(id)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_ref() {
            Some(token) => builder.header("Authorization", token.expose_secret()),
            None => builder,
        }
    }

    /// Waits for rate limiter and makes an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_token(path, None).await
    }

    /// GET authorized with `token` instead of the installed session token.
    async fn get_with_token<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("GET {}", url);

        let request = self.http.get(&url).header("Accept", "application/json");
        let request = match token {
            Some(token) => request.header("Authorization", token),
            None => self.authorize(request),
        };
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Waits for rate limiter and makes an authenticated POST request.
    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.post_raw(path, Some(body)).await?;
        self.handle_response(response).await
    }

    async fn post_raw<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        let body_json = match body {
            Some(b) => serde_json::to_string(b)?,
            None => String::new(),
        };

        tracing::debug!("POST {} body_len={}", url, body_json.len());

        let request = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(body_json);

        Ok(self.authorize(request).send().await?)
    }

    /// Handles API response, converting errors appropriately.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(TastytradeError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status.as_u16(), &text));
        }

        let envelope = response.json::<DataEnvelope<T>>().await?;
        Ok(envelope.data)
    }

    /// Parses a non-2xx body into a structured rejection when possible.
    fn error_from_body(status_code: u16, text: &str) -> TastytradeError {
        match serde_json::from_str::<ErrorEnvelope>(text) {
            Ok(ErrorEnvelope { error }) if error.message.is_some() || !error.errors.is_empty() => {
                TastytradeError::rejected(
                    status_code,
                    error.message.unwrap_or_default(),
                    error.errors,
                )
            }
            _ => TastytradeError::api(status_code, text),
        }
    }

    // =========================================================================
    // Session Endpoints
    // =========================================================================

    /// Exchanges credentials for a session token.
    ///
    /// Does not install the token; see [`Self::set_session_token`].
    ///
    /// # Errors
    /// Returns [`TastytradeError::Authentication`] carrying the HTTP status and
    /// body on any non-2xx response.
    pub async fn login(&self, credentials: &Credentials) -> Result<String> {
        let body = LoginBody {
            login: credentials.username(),
            password: credentials.password(),
            remember_me: true,
        };

        self.rate_limiter.until_ready().await;
        let url = format!("{}/sessions", self.config.base_url);
        tracing::debug!(username = credentials.username(), "POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TastytradeError::authentication(status.as_u16(), text));
        }

        let envelope = response.json::<DataEnvelope<RawLogin>>().await?;
        Ok(envelope.data.session_token)
    }

    /// Round-trips the installed session token.
    ///
    /// # Returns
    /// `true` on HTTP 200 or 201, `false` on any other status.
    ///
    /// # Errors
    /// Returns error only when no response was received.
    pub async fn validate_session(&self) -> Result<bool> {
        if !self.has_session_token() {
            return Ok(false);
        }
        let response = self.post_raw::<()>("/sessions/validate", None).await?;
        let code = response.status().as_u16();
        tracing::debug!(status = code, "session validation response");
        Ok(code == 200 || code == 201)
    }

    /// Fetches the streaming token for a session token that is not yet
    /// installed on this client.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn quote_streamer_token_for(&self, session_token: &str) -> Result<StreamerToken> {
        self.get_with_token("/quote-streamer-tokens", Some(session_token))
            .await
    }

    // =========================================================================
    // Account Endpoints
    // =========================================================================

    /// Lists accounts on the login.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let data: ItemsData<RawAccountItem> = self.get("/customers/me/accounts").await?;
        Ok(data.items.into_iter().map(|i| i.account).collect())
    }

    /// Returns the first open account.
    ///
    /// # Errors
    /// Returns [`TastytradeError::NoAccount`] if every account is closed.
    pub async fn primary_account(&self) -> Result<Account> {
        self.accounts()
            .await?
            .into_iter()
            .find(|a| !a.is_closed)
            .ok_or(TastytradeError::NoAccount)
    }

    // =========================================================================
    // Instrument Endpoints
    // =========================================================================

    /// Fetches the nested option chain for an underlying.
    ///
    /// # Errors
    /// Returns error if the symbol is invalid, the API call fails, or no
    /// chain is returned.
    pub async fn option_chain(&self, symbol: &str) -> Result<OptionChain> {
        let symbol = Self::validate_identifier(symbol)?;
        let path = format!("/option-chains/{symbol}/nested");

        let data: ItemsData<RawNestedChain> = self.get(&path).await?;

        data.items
            .into_iter()
            .next()
            .map(OptionChain::from)
            .ok_or_else(|| TastytradeError::chain_not_found(symbol))
    }

    // =========================================================================
    // Order Endpoints
    // =========================================================================

    /// Submits an order for validation without executing it.
    ///
    /// # Errors
    /// Returns [`TastytradeError::Rejected`] with the parsed error list when
    /// the order fails validation.
    pub async fn dry_run_order(
        &self,
        account_number: &str,
        order: &OrderRequest,
    ) -> Result<OrderResponse> {
        let account_number = Self::validate_identifier(account_number)?;
        let path = format!("/accounts/{account_number}/orders/dry-run");
        self.post(&path, order).await
    }

    /// Places a live order.
    ///
    /// # Errors
    /// Returns error if the order is rejected or the API call fails.
    pub async fn place_order(
        &self,
        account_number: &str,
        order: &OrderRequest,
    ) -> Result<OrderResponse> {
        let account_number = Self::validate_identifier(account_number)?;
        let path = format!("/accounts/{account_number}/orders");
        self.post(&path, order).await
    }

    /// Gets a placed order.
    ///
    /// # Errors
    /// Returns error if the order is not found.
    pub async fn get_order(&self, account_number: &str, order_id: i64) -> Result<PlacedOrder> {
        let account_number = Self::validate_identifier(account_number)?;
        let path = format!("/accounts/{account_number}/orders/{order_id}");

        match self.get::<RawOrderData>(&path).await {
            Ok(data) => Ok(data.order),
            Err(e) if e.status_code() == Some(404) => {
                Err(TastytradeError::order_not_found(order_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

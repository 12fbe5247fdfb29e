use crate::symbology::OptionRight;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tastytrade: TastytradeConfig,
    pub streamer: StreamerConfig,
    pub strategy: StrategyConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TastytradeConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
    /// Account to trade; the first open account is used when unset.
    pub account_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Deadline for one market data aggregation round.
    pub aggregation_timeout_secs: u64,
    pub keepalive_secs: u64,
}

/// Spread being opened on each invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub symbol: String,
    /// Target days to expiration.
    pub dte: i64,
    /// Target delta magnitude in percent (20 = 0.20 delta).
    pub delta: Decimal,
    /// Strike distance between the legs; `None` opens a single leg.
    pub width: Option<Decimal>,
    /// Negative opens a credit position, positive a debit position.
    pub quantity: i32,
    pub right: OptionRight,
    /// Validate only; never place a live order.
    pub dry_run: bool,
    pub portfolio: Portfolio,
    /// Profit to capture before closing, as a fraction of the entry price (0.5 = 50%).
    pub profit_target_pct: Option<Decimal>,
    pub fill_wait_secs: u64,
}

/// Portfolio tag stamped on execution records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Portfolio {
    Live,
    #[default]
    Paper,
    Dev,
}

impl Portfolio {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Paper => "PAPER",
            Self::Dev => "DEV",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding the `credentials` and `session-cache` secrets.
    pub secrets_dir: String,
    /// Directory for JSON-lines record tables.
    pub records_dir: String,
    pub database_url: Option<String>,
    pub executions_table: String,
}

impl Default for TastytradeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tastyworks.com".to_string(),
            timeout_secs: 30,
            requests_per_second: 5,
            account_number: None,
        }
    }
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            aggregation_timeout_secs: 30,
            keepalive_secs: 30,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "SPX".to_string(),
            dte: 1,
            delta: Decimal::from(20),
            width: Some(Decimal::from(20)),
            quantity: -1,
            right: OptionRight::Put,
            dry_run: true,
            portfolio: Portfolio::Paper,
            profit_target_pct: None,
            fill_wait_secs: 2,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            secrets_dir: "secrets".to_string(),
            records_dir: "records".to_string(),
            database_url: None,
            executions_table: "Executions".to_string(),
        }
    }
}

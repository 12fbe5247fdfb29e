//! Data models for the tastytrade API.
//!
//! Order payloads serialize with the kebab-case keys and display-string enum
//! values the API expects (`"Sell to Open"`, `"Credit"`, ...).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spreadbot_core::OptionRight;

use crate::error::ApiErrorDetail;

// =============================================================================
// Accounts
// =============================================================================

/// A brokerage account on the login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Account {
    pub account_number: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_closed: bool,
}

// =============================================================================
// Option Chain
// =============================================================================

/// Minimum price increment, optionally bounded by a price threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSize {
    pub value: Decimal,
    /// Applies to prices below this threshold; `None` means no upper bound.
    #[serde(default)]
    pub threshold: Option<Decimal>,
}

/// One strike of an expiration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strike {
    pub price: Decimal,
    pub call: String,
    pub put: String,
    pub call_streamer_symbol: String,
    pub put_streamer_symbol: String,
}

impl Strike {
    /// Brokerage identifier for the given side.
    #[must_use]
    pub fn symbol(&self, right: OptionRight) -> &str {
        match right {
            OptionRight::Call => &self.call,
            OptionRight::Put => &self.put,
        }
    }

    /// Streaming feed identifier for the given side.
    #[must_use]
    pub fn streamer_symbol(&self, right: OptionRight) -> &str {
        match right {
            OptionRight::Call => &self.call_streamer_symbol,
            OptionRight::Put => &self.put_streamer_symbol,
        }
    }
}

/// One expiration of a chain with its strikes sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    pub date: NaiveDate,
    pub days_to_expiration: i64,
    pub strikes: Vec<Strike>,
}

impl Expiration {
    /// Finds the strike priced exactly at `price`.
    #[must_use]
    pub fn strike_at(&self, price: Decimal) -> Option<&Strike> {
        self.strikes.iter().find(|s| s.price == price)
    }
}

/// Option chain snapshot for one underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    pub tick_sizes: Vec<TickSize>,
    pub expirations: Vec<Expiration>,
}

impl OptionChain {
    /// Builds a chain, sorting every expiration's strikes ascending and the
    /// tick sizes by threshold with the unbounded entry last.
    #[must_use]
    pub fn new(
        underlying: impl Into<String>,
        mut tick_sizes: Vec<TickSize>,
        mut expirations: Vec<Expiration>,
    ) -> Self {
        tick_sizes.sort_by_key(|t| (t.threshold.is_none(), t.threshold));
        for exp in &mut expirations {
            exp.strikes.sort_by(|a, b| a.price.cmp(&b.price));
        }
        Self {
            underlying: underlying.into(),
            tick_sizes,
            expirations,
        }
    }

    /// Tick size applying to `price`.
    ///
    /// The smallest threshold above the price magnitude wins, then the
    /// unbounded entry. With neither, the entry with the largest threshold
    /// applies. Independent of the order of `tick_sizes`.
    #[must_use]
    pub fn tick_for(&self, price: Decimal) -> Option<Decimal> {
        let magnitude = price.abs();
        let bounded = self
            .tick_sizes
            .iter()
            .filter_map(|t| t.threshold.map(|limit| (limit, t.value)));
        bounded
            .clone()
            .filter(|(limit, _)| magnitude < *limit)
            .min_by_key(|(limit, _)| *limit)
            .map(|(_, value)| value)
            .or_else(|| {
                self.tick_sizes
                    .iter()
                    .find(|t| t.threshold.is_none())
                    .map(|t| t.value)
            })
            .or_else(|| bounded.max_by_key(|(limit, _)| *limit).map(|(_, value)| value))
    }
}

/// Session tokens for the quote streamer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreamerToken {
    pub token: String,
    pub dxlink_url: String,
}

// =============================================================================
// Orders
// =============================================================================

/// Leg action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    #[serde(rename = "Sell to Open")]
    SellToOpen,
    #[serde(rename = "Buy to Open")]
    BuyToOpen,
    #[serde(rename = "Buy to Close")]
    BuyToClose,
    #[serde(rename = "Sell to Close")]
    SellToClose,
}

impl OrderAction {
    /// The action that unwinds this one; closing actions have no inverse.
    #[must_use]
    pub const fn closing(self) -> Option<Self> {
        match self {
            Self::SellToOpen => Some(Self::BuyToClose),
            Self::BuyToOpen => Some(Self::SellToClose),
            Self::BuyToClose | Self::SellToClose => None,
        }
    }

    #[must_use]
    pub const fn is_opening(self) -> bool {
        matches!(self, Self::SellToOpen | Self::BuyToOpen)
    }

    #[must_use]
    pub const fn is_sell(self) -> bool {
        matches!(self, Self::SellToOpen | Self::SellToClose)
    }

    /// Wire string, also used in execution record ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SellToOpen => "Sell to Open",
            Self::BuyToOpen => "Buy to Open",
            Self::BuyToClose => "Buy to Close",
            Self::SellToClose => "Sell to Close",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "Equity Option")]
    EquityOption,
    #[serde(rename = "Index Option")]
    IndexOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceEffect {
    Credit,
    Debit,
}

impl PriceEffect {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    #[serde(rename = "GTC")]
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// One leg of an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderLeg {
    pub instrument_type: InstrumentType,
    pub symbol: String,
    /// Always positive; direction lives in `action`.
    pub quantity: u32,
    pub action: OrderAction,
}

/// Order submitted for dry-run or live placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderRequest {
    pub time_in_force: TimeInForce,
    pub order_type: OrderType,
    /// Positive limit price; the sign lives in `price_effect`.
    pub price: Decimal,
    pub price_effect: PriceEffect,
    pub legs: Vec<OrderLeg>,
}

/// A warning or notice returned alongside an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuyingPowerEffect {
    pub change_in_buying_power: Decimal,
    #[serde(default)]
    pub change_in_buying_power_effect: Option<PriceEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeeCalculation {
    pub total_fees: Decimal,
    #[serde(default)]
    pub total_fees_effect: Option<PriceEffect>,
}

/// Order lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Received,
    Routed,
    #[serde(rename = "In Flight")]
    InFlight,
    Live,
    Filled,
    Cancelled,
    Expired,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled)
    }
}

/// A fill on one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LegFill {
    pub fill_price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlacedLeg {
    pub symbol: String,
    pub quantity: Decimal,
    pub action: OrderAction,
    #[serde(default)]
    pub fills: Vec<LegFill>,
}

impl PlacedLeg {
    /// Quantity-weighted average fill price, if any fills exist.
    #[must_use]
    pub fn average_fill_price(&self) -> Option<Decimal> {
        let filled: Decimal = self.fills.iter().map(|f| f.quantity).sum();
        if filled.is_zero() {
            return None;
        }
        let notional: Decimal = self.fills.iter().map(|f| f.fill_price * f.quantity).sum();
        Some(notional / filled)
    }
}

/// An order as the brokerage reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlacedOrder {
    pub id: i64,
    pub status: OrderStatus,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub price_effect: Option<PriceEffect>,
    #[serde(default)]
    pub legs: Vec<PlacedLeg>,
}

/// Outcome of a dry-run or live submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderResponse {
    #[serde(default)]
    pub order: Option<PlacedOrder>,
    #[serde(default)]
    pub warnings: Vec<ApiMessage>,
    #[serde(default)]
    pub buying_power_effect: Option<BuyingPowerEffect>,
    #[serde(default)]
    pub fee_calculation: Option<FeeCalculation>,
}

/// Parsed `error` object of a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

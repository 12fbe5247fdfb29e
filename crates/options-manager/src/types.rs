//! Types shared across spread construction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spreadbot_core::OptionRight;
use spreadbot_tastytrade::{
    ApiErrorDetail, ApiMessage, Expiration, OrderRequest, PriceEffect, Strike,
};

/// Spread classification carried on execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadKind {
    Single,
    Vertical,
    IronCondor,
    Butterfly,
    BullPut,
    DoubleCalendar,
}

impl SpreadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Vertical => "VERTICAL",
            Self::IronCondor => "IRON_CONDOR",
            Self::Butterfly => "BUTTERFLY",
            Self::BullPut => "BULL_PUT",
            Self::DoubleCalendar => "DOUBLE_CALENDAR",
        }
    }

    /// Kind of an opening order built from a selection.
    #[must_use]
    pub fn for_opening(right: OptionRight, has_pair: bool, quantity: i32) -> Self {
        match (has_pair, right) {
            (false, _) => Self::Single,
            (true, OptionRight::Put) if quantity < 0 => Self::BullPut,
            (true, _) => Self::Vertical,
        }
    }
}

impl std::fmt::Display for SpreadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of strike selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub expiration: Expiration,
    pub anchor: Strike,
    /// Delta of the anchor, as streamed.
    pub anchor_delta: Decimal,
    /// Protective leg; absent for single-leg orders.
    pub paired: Option<Strike>,
    pub right: OptionRight,
}

impl Selection {
    /// Streamer symbols of the selected legs, anchor first.
    #[must_use]
    pub fn streamer_symbols(&self) -> Vec<String> {
        std::iter::once(&self.anchor)
            .chain(self.paired.as_ref())
            .map(|s| s.streamer_symbol(self.right).to_string())
            .collect()
    }

    /// Distance between the two strikes; `None` for a single leg.
    #[must_use]
    pub fn width(&self) -> Option<Decimal> {
        self.paired
            .as_ref()
            .map(|p| (self.anchor.price - p.price).abs())
    }
}

/// Result of a dry-run submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub accepted: bool,
    /// Signed change in buying power; negative when buying power is consumed.
    pub buying_power_effect: Option<Decimal>,
    pub total_fees: Option<Decimal>,
    pub warnings: Vec<ApiMessage>,
    /// Structured errors as returned by the brokerage.
    pub errors: Vec<ApiErrorDetail>,
    /// Top-level rejection message.
    pub message: Option<String>,
}

/// Human-readable digest of a validated order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub name: String,
    pub symbol: String,
    pub strategy: String,
    pub expiration: chrono::NaiveDate,
    pub delta: Decimal,
    pub price: Decimal,
    pub price_effect: PriceEffect,
    pub buying_power_effect: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub spread_width: Option<Decimal>,
}

impl OrderSummary {
    /// Signed limit price: positive for credits.
    #[must_use]
    pub fn signed_price(order: &OrderRequest) -> Decimal {
        match order.price_effect {
            PriceEffect::Credit => order.price,
            PriceEffect::Debit => -order.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_kind_for_opening() {
        assert_eq!(
            SpreadKind::for_opening(OptionRight::Put, true, -1),
            SpreadKind::BullPut
        );
        assert_eq!(
            SpreadKind::for_opening(OptionRight::Put, true, 1),
            SpreadKind::Vertical
        );
        assert_eq!(
            SpreadKind::for_opening(OptionRight::Call, false, -1),
            SpreadKind::Single
        );
    }

    #[test]
    fn test_spread_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&SpreadKind::DoubleCalendar).unwrap();
        assert_eq!(json, "\"DOUBLE_CALENDAR\"");
        assert_eq!(SpreadKind::BullPut.to_string(), "BULL_PUT");
    }
}

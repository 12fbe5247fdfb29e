//! Strategy names and order summaries for operators.

use crate::types::{OrderSummary, Selection, ValidationResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use spreadbot_core::OptionRight;
use spreadbot_tastytrade::{OrderAction, OrderRequest};

/// Recognised trade shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    NakedPut,
    NakedCall,
    PutSpread,
    CallSpread,
    IronCondor,
    DoubleCalendar,
    Custom,
}

impl TradeType {
    /// Shape of an opening order built from a selection.
    #[must_use]
    pub fn for_selection(right: OptionRight, has_pair: bool) -> Self {
        match (right, has_pair) {
            (OptionRight::Put, false) => Self::NakedPut,
            (OptionRight::Call, false) => Self::NakedCall,
            (OptionRight::Put, true) => Self::PutSpread,
            (OptionRight::Call, true) => Self::CallSpread,
        }
    }
}

/// A leg reduced to what naming needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedLeg {
    pub expiration: NaiveDate,
    pub strike: Decimal,
    pub action: OrderAction,
}

fn strike_label(strike: Decimal) -> String {
    strike.normalize().to_string()
}

fn joined(strikes: &[Decimal]) -> String {
    strikes
        .iter()
        .map(|s| strike_label(*s))
        .collect::<Vec<_>>()
        .join("/")
}

fn long_or_short(leg: &NamedLeg) -> &'static str {
    if leg.action.is_sell() {
        "Short"
    } else {
        "Long"
    }
}

/// Bull when the lower strike is bought, bear when it is sold.
fn bull_or_bear(legs: &[NamedLeg]) -> &'static str {
    match legs.iter().min_by_key(|l| l.strike) {
        Some(lowest) if lowest.action.is_sell() => "Bear",
        _ => "Bull",
    }
}

/// Strategy label without symbol, date or strikes, e.g. `"Bull Put Spread"`.
#[must_use]
pub fn strategy_label(trade_type: TradeType, legs: &[NamedLeg]) -> String {
    match (trade_type, legs) {
        (TradeType::NakedPut, [leg]) => format!("{} Put", long_or_short(leg)),
        (TradeType::NakedCall, [leg]) => format!("{} Call", long_or_short(leg)),
        (TradeType::PutSpread, [_, _]) => format!("{} Put Spread", bull_or_bear(legs)),
        (TradeType::CallSpread, [_, _]) => format!("{} Call Spread", bull_or_bear(legs)),
        (TradeType::IronCondor, [_, _, _, _]) => "Iron Condor".to_string(),
        (TradeType::DoubleCalendar, _) if distinct_expirations(legs).len() >= 2 => {
            "Double Calendar".to_string()
        }
        _ => "Custom Strategy".to_string(),
    }
}

fn distinct_expirations(legs: &[NamedLeg]) -> Vec<NaiveDate> {
    let mut expirations: Vec<NaiveDate> = legs.iter().map(|l| l.expiration).collect();
    expirations.sort_unstable();
    expirations.dedup();
    expirations
}

/// Operator-facing strategy name, e.g. `"SPX Oct 14 4100/4120 Bull Put Spread"`.
///
/// Shapes whose legs do not match the expected count fall back to a custom
/// name listing every strike.
#[must_use]
pub fn strategy_name(trade_type: TradeType, symbol: &str, legs: &[NamedLeg]) -> String {
    let expirations = distinct_expirations(legs);
    let Some(first_expiration) = expirations.first() else {
        return format!("{symbol} Custom Strategy");
    };
    let label = strategy_label(trade_type, legs);

    let mut strikes: Vec<Decimal> = legs.iter().map(|l| l.strike).collect();
    strikes.sort_unstable();

    let dates = if trade_type == TradeType::DoubleCalendar && expirations.len() >= 2 {
        strikes.dedup();
        format!(
            "{}/{}",
            first_expiration.format("%b %d"),
            expirations[1].format("%b %d")
        )
    } else {
        first_expiration.format("%b %d").to_string()
    };

    format!("{symbol} {dates} {} {label}", joined(&strikes))
}

/// Legs of `order` paired with the selection they were built from.
#[must_use]
pub fn named_legs(selection: &Selection, order: &OrderRequest) -> Vec<NamedLeg> {
    std::iter::once(&selection.anchor)
        .chain(selection.paired.as_ref())
        .zip(&order.legs)
        .map(|(strike, leg)| NamedLeg {
            expiration: selection.expiration.date,
            strike: strike.price,
            action: leg.action,
        })
        .collect()
}

/// Digest of a validated order for logging and reports.
#[must_use]
pub fn summarize(
    symbol: &str,
    selection: &Selection,
    order: &OrderRequest,
    validation: &ValidationResult,
) -> OrderSummary {
    let trade_type = TradeType::for_selection(selection.right, selection.paired.is_some());
    let legs = named_legs(selection, order);
    let name = strategy_name(trade_type, symbol, &legs);
    let strategy = strategy_label(trade_type, &legs);

    OrderSummary {
        name,
        symbol: symbol.to_string(),
        strategy,
        expiration: selection.expiration.date,
        delta: selection.anchor_delta,
        price: order.price,
        price_effect: order.price_effect,
        buying_power_effect: validation.buying_power_effect,
        fees: validation.total_fees,
        spread_width: selection.width(),
    }
}

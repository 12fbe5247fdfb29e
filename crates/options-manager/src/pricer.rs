//! Spread pricing from leg quotes.

use crate::error::{OptionsError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use spreadbot_core::Quote;

/// Unrounded mid of the spread that sells `anchor` and buys `paired`.
///
/// `bid = anchor.bid - paired.ask`, `ask = anchor.ask - paired.bid`.
#[must_use]
pub fn raw_mid(anchor: &Quote, paired: &Quote) -> Decimal {
    let bid = anchor.bid - paired.ask;
    let ask = anchor.ask - paired.bid;
    (bid + ask) / Decimal::TWO
}

/// Rounds `price` to the nearest multiple of `tick`, ties to even.
///
/// # Errors
/// Returns [`OptionsError::InvalidTickSize`] if `tick` is not positive.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal> {
    if tick <= Decimal::ZERO {
        return Err(OptionsError::InvalidTickSize(tick));
    }
    let ticks = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    Ok((ticks * tick).normalize())
}

/// Credit spread price rounded to tick.
///
/// # Errors
/// Returns [`OptionsError::InvalidTickSize`] if `tick` is not positive.
pub fn price_credit(anchor: &Quote, paired: &Quote, tick: Decimal) -> Result<Decimal> {
    round_to_tick(raw_mid(anchor, paired), tick)
}

/// Single-leg price: the quote mid rounded to tick.
///
/// # Errors
/// Returns [`OptionsError::InvalidTickSize`] if `tick` is not positive.
pub fn price_single(quote: &Quote, tick: Decimal) -> Result<Decimal> {
    round_to_tick(quote.mid(), tick)
}

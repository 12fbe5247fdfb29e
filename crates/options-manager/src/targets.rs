//! Profit target: a resting closing order placed once the entry fills.

use crate::error::{OptionsError, Result};
use crate::order_builder::OrderBuilder;
use crate::pricer::round_to_tick;
use rust_decimal::Decimal;
use spreadbot_tastytrade::{OrderRequest, OrderStatus, PriceEffect, TastytradeClient};
use std::time::Duration;

/// What happened when the profit target was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Closing order accepted by the brokerage.
    Placed { order_id: Option<i64>, price: Decimal },
    /// Entry had not filled when checked; no closing order was sent.
    NotFilled { status: OrderStatus },
}

/// Closing price that captures `profit_target_pct` of the entry price.
///
/// A credit entry buys back at `entry * (1 - profit_target_pct)`; a debit
/// entry sells at `entry * (1 + profit_target_pct)`. Both are rounded to
/// tick. A 0.5 target on a 1.00 credit buys back at 0.50, on a 1.00 debit
/// it sells at 1.50.
///
/// # Errors
/// Returns [`OptionsError::InvalidOrder`] unless `0 < profit_target_pct < 1`,
/// or [`OptionsError::InvalidTickSize`] for a bad tick.
pub fn closing_price(
    entry: Decimal,
    entry_effect: PriceEffect,
    profit_target_pct: Decimal,
    tick: Decimal,
) -> Result<Decimal> {
    if profit_target_pct <= Decimal::ZERO || profit_target_pct >= Decimal::ONE {
        return Err(OptionsError::invalid_order(format!(
            "profit target must be between 0 and 1, got {profit_target_pct}"
        )));
    }
    let factor = match entry_effect {
        PriceEffect::Credit => Decimal::ONE - profit_target_pct,
        PriceEffect::Debit => Decimal::ONE + profit_target_pct,
    };
    let price = round_to_tick(entry * factor, tick)?;
    if price <= Decimal::ZERO {
        return Err(OptionsError::invalid_order(format!(
            "closing price rounds to {price} at tick {tick}"
        )));
    }
    Ok(price)
}

/// Places the closing order for a filled entry.
#[derive(Debug, Clone)]
pub struct ProfitTarget {
    pub profit_target_pct: Decimal,
    pub tick: Decimal,
    pub fill_wait: Duration,
}

impl ProfitTarget {
    /// Waits `fill_wait`, checks the entry once, and places the closing
    /// order only if the entry is filled.
    ///
    /// # Errors
    /// Returns error if the order lookup or placement fails.
    pub async fn place(
        &self,
        client: &TastytradeClient,
        builder: &OrderBuilder,
        account: &str,
        entry_id: i64,
        entry: &OrderRequest,
    ) -> Result<TargetOutcome> {
        tokio::time::sleep(self.fill_wait).await;

        let placed = client
            .get_order(account, entry_id)
            .await
            .map_err(OptionsError::from_broker)?;
        if !placed.status.is_filled() {
            tracing::info!(order_id = entry_id, status = ?placed.status, "entry not filled, skipping profit target");
            return Ok(TargetOutcome::NotFilled {
                status: placed.status,
            });
        }

        let entry_price = placed.price.unwrap_or(entry.price);
        let price = closing_price(
            entry_price,
            entry.price_effect,
            self.profit_target_pct,
            self.tick,
        )?;
        let closing = builder.build_closing(entry, price)?;

        let response = client
            .place_order(account, &closing)
            .await
            .map_err(OptionsError::from_order_submission)?;
        let order_id = response.order.as_ref().map(|o| o.id);

        tracing::info!(
            entry_id,
            closing_id = ?order_id,
            entry_price = %entry_price,
            entry_effect = ?entry.price_effect,
            closing_price = %price,
            "profit target placed"
        );
        Ok(TargetOutcome::Placed { order_id, price })
    }
}

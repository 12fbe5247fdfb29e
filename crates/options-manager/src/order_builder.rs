//! Opening and closing order construction.
//!
//! The sign of `quantity` fixes every leg action and the price effect:
//! negative quantities sell the anchor for a credit, positive quantities buy
//! it for a debit. Leg quantities are always the absolute value.

use crate::error::{OptionsError, Result};
use rust_decimal::Decimal;
use spreadbot_core::OptionRight;
use spreadbot_tastytrade::{
    InstrumentType, OrderAction, OrderLeg, OrderRequest, OrderType, PriceEffect, Strike,
    TimeInForce,
};

/// Builds orders for one instrument type.
#[derive(Debug, Clone, Copy)]
pub struct OrderBuilder {
    instrument_type: InstrumentType,
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new(InstrumentType::EquityOption)
    }
}

fn check_inputs(quantity: i32, price: Decimal) -> Result<u32> {
    if quantity == 0 {
        return Err(OptionsError::invalid_order("quantity must be non-zero"));
    }
    if price <= Decimal::ZERO {
        return Err(OptionsError::invalid_order(format!(
            "limit price must be positive, got {price}"
        )));
    }
    Ok(quantity.unsigned_abs())
}

fn direction(quantity: i32) -> (OrderAction, OrderAction, PriceEffect) {
    if quantity < 0 {
        (OrderAction::SellToOpen, OrderAction::BuyToOpen, PriceEffect::Credit)
    } else {
        (OrderAction::BuyToOpen, OrderAction::SellToOpen, PriceEffect::Debit)
    }
}

impl OrderBuilder {
    #[must_use]
    pub fn new(instrument_type: InstrumentType) -> Self {
        Self { instrument_type }
    }

    /// Instrument type for an underlying: cash-settled indices trade as
    /// index options.
    #[must_use]
    pub fn for_underlying(symbol: &str) -> Self {
        match symbol {
            "SPX" | "SPXW" | "XSP" | "NDX" | "RUT" | "VIX" => {
                Self::new(InstrumentType::IndexOption)
            }
            _ => Self::default(),
        }
    }

    fn leg(&self, strike: &Strike, right: OptionRight, quantity: u32, action: OrderAction) -> OrderLeg {
        OrderLeg {
            instrument_type: self.instrument_type,
            symbol: strike.symbol(right).to_string(),
            quantity,
            action,
        }
    }

    /// Two-leg opening order, anchor leg first.
    ///
    /// # Errors
    /// Returns [`OptionsError::InvalidOrder`] for a zero quantity or a
    /// non-positive price.
    pub fn build_opening(
        &self,
        anchor: &Strike,
        paired: &Strike,
        right: OptionRight,
        quantity: i32,
        price: Decimal,
    ) -> Result<OrderRequest> {
        let size = check_inputs(quantity, price)?;
        let (anchor_action, paired_action, price_effect) = direction(quantity);

        Ok(OrderRequest {
            time_in_force: TimeInForce::Day,
            order_type: OrderType::Limit,
            price,
            price_effect,
            legs: vec![
                self.leg(anchor, right, size, anchor_action),
                self.leg(paired, right, size, paired_action),
            ],
        })
    }

    /// Single-leg opening order.
    ///
    /// # Errors
    /// Returns [`OptionsError::InvalidOrder`] for a zero quantity or a
    /// non-positive price.
    pub fn build_single(
        &self,
        anchor: &Strike,
        right: OptionRight,
        quantity: i32,
        price: Decimal,
    ) -> Result<OrderRequest> {
        let size = check_inputs(quantity, price)?;
        let (action, _, price_effect) = direction(quantity);

        Ok(OrderRequest {
            time_in_force: TimeInForce::Day,
            order_type: OrderType::Limit,
            price,
            price_effect,
            legs: vec![self.leg(anchor, right, size, action)],
        })
    }

    /// Good-till-cancelled order unwinding `open` at `price`.
    ///
    /// # Errors
    /// Returns [`OptionsError::InvalidOrder`] if `open` holds closing legs or
    /// `price` is not positive.
    pub fn build_closing(&self, open: &OrderRequest, price: Decimal) -> Result<OrderRequest> {
        if price <= Decimal::ZERO {
            return Err(OptionsError::invalid_order(format!(
                "limit price must be positive, got {price}"
            )));
        }
        let legs = open
            .legs
            .iter()
            .map(|leg| {
                let action = leg.action.closing().ok_or_else(|| {
                    OptionsError::invalid_order(format!(
                        "leg {} is already closing ({})",
                        leg.symbol, leg.action
                    ))
                })?;
                Ok(OrderLeg {
                    action,
                    ..leg.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderRequest {
            time_in_force: TimeInForce::Gtc,
            order_type: OrderType::Limit,
            price,
            price_effect: open.price_effect.opposite(),
            legs,
        })
    }
}

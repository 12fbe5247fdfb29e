//! Normalized per-leg execution records.
//!
//! One record is produced for every leg of a validated or placed order. The
//! option type, strike and expiration are decoded from the leg's fixed-width
//! identifier; the price is the mid of the leg's streamed quote.

use crate::error::{OptionsError, Result};
use crate::types::SpreadKind;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use spreadbot_core::{OptionRight, OptionSymbol, Portfolio, Quote, RecordSink};
use spreadbot_tastytrade::{OrderAction, OrderLeg};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default table for execution records.
pub const DEFAULT_EXECUTIONS_TABLE: &str = "Executions";

const DEFAULT_COMMISSION: Decimal = dec!(0.50);
const DEFAULT_FEES: Decimal = dec!(0.10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl From<OptionRight> for OptionType {
    fn from(right: OptionRight) -> Self {
        match right {
            OptionRight::Call => Self::Call,
            OptionRight::Put => Self::Put,
        }
    }
}

/// Market column of an execution row. Only options are traded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    #[default]
    Options,
}

/// One leg of one order, as traded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub underlying_symbol: String,
    pub symbol: String,
    pub action: OrderAction,
    pub spread: SpreadKind,
    pub option_type: OptionType,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub expiration_date: NaiveDate,
    /// Always the absolute leg quantity.
    pub quantity: u32,
    pub price: Decimal,
    pub strike: Decimal,
    pub market: Market,
    pub portfolio: Portfolio,
    pub commission: Decimal,
    pub fees: Decimal,
    /// 1-based position of the leg in its order.
    pub leg_number: usize,
}

/// `"{action}__{symbol}__{YYYYmmdd_HHMMSS}"`.
#[must_use]
pub fn record_id(action: OrderAction, symbol: &str, at: DateTime<Utc>) -> String {
    format!("{action}__{symbol}__{}", at.format("%Y%m%d_%H%M%S"))
}

/// Builds and persists [`ExecutionRecord`]s.
#[derive(Clone)]
pub struct ExecutionRecorder {
    sink: Arc<dyn RecordSink>,
    table: String,
    portfolio: Portfolio,
    commission: Decimal,
    fees: Decimal,
}

impl std::fmt::Debug for ExecutionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRecorder")
            .field("table", &self.table)
            .field("portfolio", &self.portfolio)
            .field("commission", &self.commission)
            .field("fees", &self.fees)
            .finish_non_exhaustive()
    }
}

impl ExecutionRecorder {
    #[must_use]
    pub fn new(sink: Arc<dyn RecordSink>, portfolio: Portfolio) -> Self {
        Self {
            sink,
            table: DEFAULT_EXECUTIONS_TABLE.to_string(),
            portfolio,
            commission: DEFAULT_COMMISSION,
            fees: DEFAULT_FEES,
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn with_costs(mut self, commission: Decimal, fees: Decimal) -> Self {
        self.commission = commission;
        self.fees = fees;
        self
    }

    #[must_use]
    pub fn portfolio(&self) -> Portfolio {
        self.portfolio
    }

    /// Builds the record for `leg` stamped with the current time.
    ///
    /// # Errors
    /// See [`Self::record_at`].
    pub fn record(
        &self,
        underlying: &str,
        leg: &OrderLeg,
        leg_number: usize,
        quotes: &HashMap<String, Quote>,
        spread: SpreadKind,
    ) -> Result<ExecutionRecord> {
        self.record_at(underlying, leg, leg_number, quotes, spread, Utc::now())
    }

    /// Builds the record for `leg` stamped with `at`.
    ///
    /// # Errors
    /// Returns [`OptionsError::Symbol`] for an undecodable identifier or
    /// [`OptionsError::OptionNotFound`] when no quote matches the leg.
    pub fn record_at(
        &self,
        underlying: &str,
        leg: &OrderLeg,
        leg_number: usize,
        quotes: &HashMap<String, Quote>,
        spread: SpreadKind,
        at: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        let decoded = OptionSymbol::parse(&leg.symbol)?;
        let streamer = decoded.streamer_symbol();
        let quote = quotes.get(&streamer).ok_or_else(|| {
            OptionsError::option_not_found(format!("no quote for {streamer}"))
        })?;

        Ok(ExecutionRecord {
            id: record_id(leg.action, &leg.symbol, at),
            underlying_symbol: underlying.to_string(),
            symbol: leg.symbol.clone(),
            action: leg.action,
            spread,
            option_type: decoded.right.into(),
            date: at.date_naive(),
            time: at.time(),
            expiration_date: decoded.expiration,
            quantity: leg.quantity,
            price: quote.mid(),
            strike: decoded.strike,
            market: Market::Options,
            portfolio: self.portfolio,
            commission: self.commission,
            fees: self.fees,
            leg_number,
        })
    }

    /// Writes `record` to the sink keyed by its id.
    ///
    /// # Errors
    /// Returns [`OptionsError::Persistence`] if serialization or the sink fails.
    pub async fn persist(&self, record: &ExecutionRecord) -> Result<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| OptionsError::Persistence(e.to_string()))?;
        self.sink
            .put(&self.table, &record.id, value)
            .await
            .map_err(|e| OptionsError::Persistence(format!("{e:#}")))?;
        debug!(table = %self.table, id = %record.id, "execution recorded");
        Ok(())
    }

    /// Records and persists every leg, continuing past individual failures.
    ///
    /// # Returns
    /// The persisted records and the errors of the legs that failed.
    pub async fn record_legs(
        &self,
        underlying: &str,
        legs: &[OrderLeg],
        quotes: &HashMap<String, Quote>,
        spread: SpreadKind,
    ) -> (Vec<ExecutionRecord>, Vec<OptionsError>) {
        let now = Utc::now();
        let mut written = Vec::with_capacity(legs.len());
        let mut failures = Vec::new();

        for (index, leg) in legs.iter().enumerate() {
            let outcome = match self.record_at(underlying, leg, index + 1, quotes, spread, now) {
                Ok(record) => self.persist(&record).await.map(|()| record),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(record) => written.push(record),
                Err(e) => {
                    tracing::error!(symbol = %leg.symbol, error = %e, "failed to record execution");
                    failures.push(e);
                }
            }
        }

        info!(
            written = written.len(),
            failed = failures.len(),
            portfolio = self.portfolio.as_str(),
            "execution records written"
        );
        (written, failures)
    }
}

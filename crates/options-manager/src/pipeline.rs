//! End-to-end spread opening run.
//!
//! ```text
//! Init -> Authenticated -> ChainFetched -> StrikesSelected -> Priced
//!      -> OrderBuilt -> Validated -> Placed | Rejected
//! ```
//!
//! Dry-run mode ends successfully at `Validated`. Any other failure ends the
//! run in `Failed` with the last completed state and whatever was gathered up
//! to that point. No step is retried; a failed run starts over from `Init`.

use crate::aggregator::MarketDataAggregator;
use crate::error::{OptionsError, Result};
use crate::naming::summarize;
use crate::order_builder::OrderBuilder;
use crate::pricer::{price_credit, price_single, raw_mid};
use crate::recorder::{ExecutionRecord, ExecutionRecorder};
use crate::selector::{SelectionParams, StrikeSelector};
use crate::targets::{ProfitTarget, TargetOutcome};
use crate::types::{OrderSummary, Selection, SpreadKind, ValidationResult};
use crate::validator::OrderValidator;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spreadbot_core::{MarketDataConnector, Quote, StrategyConfig};
use spreadbot_tastytrade::{OptionChain, OrderRequest, SessionManager};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Tick used when the chain lists no tick sizes.
const FALLBACK_TICK: Decimal = dec!(0.05);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Init,
    Authenticated,
    ChainFetched,
    StrikesSelected,
    Priced,
    OrderBuilt,
    Validated,
    Placed,
    Rejected,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Data gathered so far, kept for both reports and failures.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub symbol: Option<String>,
    pub account: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub anchor_strike: Option<Decimal>,
    pub anchor_delta: Option<Decimal>,
    pub paired_strike: Option<Decimal>,
    pub tick: Option<Decimal>,
    pub price: Option<Decimal>,
    pub order: Option<OrderRequest>,
    pub validation: Option<ValidationResult>,
}

/// Successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// `Validated` for dry runs, `Placed` otherwise.
    pub state: PipelineState,
    pub summary: OrderSummary,
    pub order_id: Option<i64>,
    pub records: Vec<ExecutionRecord>,
    pub persistence_failures: usize,
    pub profit_target: Option<TargetOutcome>,
    pub profit_target_error: Option<String>,
    pub diagnostics: Diagnostics,
}

/// Unsuccessful run.
#[derive(Debug, Error)]
#[error("pipeline {state} after {last_completed}: {error}")]
pub struct PipelineFailure {
    /// `Rejected` for brokerage rejections, `Failed` otherwise.
    pub state: PipelineState,
    pub last_completed: PipelineState,
    #[source]
    pub error: OptionsError,
    pub diagnostics: Diagnostics,
}

/// Process-scoped collaborators and settings for a run.
#[derive(Clone)]
pub struct PipelineContext {
    pub session: Arc<SessionManager>,
    pub connector: Arc<dyn MarketDataConnector>,
    pub recorder: ExecutionRecorder,
    pub strategy: StrategyConfig,
    pub account_number: Option<String>,
    pub aggregation_timeout: Duration,
    pub today: Option<NaiveDate>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("session", &self.session)
            .field("recorder", &self.recorder)
            .field("strategy", &self.strategy)
            .field("account_number", &self.account_number)
            .field("aggregation_timeout", &self.aggregation_timeout)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    #[must_use]
    pub fn new(
        session: Arc<SessionManager>,
        connector: Arc<dyn MarketDataConnector>,
        recorder: ExecutionRecorder,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            session,
            connector,
            recorder,
            strategy,
            account_number: None,
            aggregation_timeout: Duration::from_secs(30),
            today: None,
        }
    }

    #[must_use]
    pub fn with_account(mut self, account_number: Option<String>) -> Self {
        self.account_number = account_number;
        self
    }

    #[must_use]
    pub fn with_aggregation_timeout(mut self, timeout: Duration) -> Self {
        self.aggregation_timeout = timeout;
        self
    }

    /// Pins the date used for DTE calculations.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

struct Run {
    state: PipelineState,
    diagnostics: Diagnostics,
}

impl Run {
    fn advance(&mut self, state: PipelineState) {
        info!(from = %self.state, to = %state, "pipeline transition");
        self.state = state;
    }
}

/// Market data gathered while the stream is open.
struct Priced {
    selection: Selection,
    quotes: HashMap<String, Quote>,
    tick: Decimal,
    price: Decimal,
}

/// Opens one spread per [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Runs every step once.
    ///
    /// # Errors
    /// Returns [`PipelineFailure`] carrying the terminal state, the last
    /// completed state and the diagnostics gathered so far.
    pub async fn run(&self) -> std::result::Result<PipelineReport, PipelineFailure> {
        let mut run = Run {
            state: PipelineState::Init,
            diagnostics: Diagnostics::default(),
        };

        match self.execute(&mut run).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let state = match error {
                    OptionsError::ValidationRejected { .. } => PipelineState::Rejected,
                    _ => PipelineState::Failed,
                };
                for line in error.rejection_lines() {
                    error!("{line}");
                }
                error!(state = %state, last_completed = %run.state, error = %error, "pipeline stopped");
                Err(PipelineFailure {
                    state,
                    last_completed: run.state,
                    error,
                    diagnostics: run.diagnostics,
                })
            }
        }
    }

    async fn execute(&self, run: &mut Run) -> Result<PipelineReport> {
        let ctx = &self.ctx;
        let strategy = &ctx.strategy;
        let client = ctx.session.client();

        // Authenticated
        let session = ctx
            .session
            .ensure_valid()
            .await
            .map_err(OptionsError::from_broker)?;
        let account = match &ctx.account_number {
            Some(number) => number.clone(),
            None => {
                client
                    .primary_account()
                    .await
                    .map_err(OptionsError::from_broker)?
                    .account_number
            }
        };
        run.diagnostics.account = Some(account.clone());
        run.advance(PipelineState::Authenticated);

        // ChainFetched
        let chain = client
            .option_chain(&strategy.symbol)
            .await
            .map_err(OptionsError::from_broker)?;
        run.diagnostics.symbol = Some(chain.underlying.clone());
        run.advance(PipelineState::ChainFetched);

        // StrikesSelected, Priced
        let stream = ctx
            .connector
            .connect(&session.dxlink_url, &session.streamer_token)
            .await
            .map_err(|e| OptionsError::MarketData(format!("{e:#}")))?;
        let mut aggregator = MarketDataAggregator::new(stream);
        let priced = self.select_and_price(run, &chain, &mut aggregator).await;
        aggregator.close().await;
        let Priced {
            selection,
            quotes,
            tick,
            price,
        } = priced?;

        // OrderBuilt
        let builder = OrderBuilder::for_underlying(&strategy.symbol);
        let order = match &selection.paired {
            Some(paired) => builder.build_opening(
                &selection.anchor,
                paired,
                selection.right,
                strategy.quantity,
                price,
            )?,
            None => builder.build_single(
                &selection.anchor,
                selection.right,
                strategy.quantity,
                price,
            )?,
        };
        run.diagnostics.order = Some(order.clone());
        run.advance(PipelineState::OrderBuilt);

        // Validated
        let validation = OrderValidator::new(client.clone())
            .dry_run(&account, &order)
            .await?;
        run.diagnostics.validation = Some(validation.clone());
        let validation = validation.into_accepted()?;
        let summary = summarize(&chain.underlying, &selection, &order, &validation);
        info!(
            name = %summary.name,
            strategy = %summary.strategy,
            expiration = %summary.expiration,
            delta = %summary.delta,
            price = %summary.price,
            buying_power_effect = ?summary.buying_power_effect,
            fees = ?summary.fees,
            spread_width = ?summary.spread_width,
            "order summary"
        );
        run.advance(PipelineState::Validated);

        let spread = SpreadKind::for_opening(
            selection.right,
            selection.paired.is_some(),
            strategy.quantity,
        );

        let mut report = PipelineReport {
            state: PipelineState::Validated,
            summary,
            order_id: None,
            records: Vec::new(),
            persistence_failures: 0,
            profit_target: None,
            profit_target_error: None,
            diagnostics: Diagnostics::default(),
        };

        if strategy.dry_run {
            info!("dry run: skipping placement");
            self.record(&mut report, &chain.underlying, &order, &quotes, spread)
                .await;
            report.diagnostics = run.diagnostics.clone();
            return Ok(report);
        }

        // Placed
        let response = client
            .place_order(&account, &order)
            .await
            .map_err(OptionsError::from_order_submission)?;
        let order_id = response.order.as_ref().map(|o| o.id);
        info!(
            order_id = ?order_id,
            status = ?response.order.as_ref().map(|o| &o.status),
            legs = order.legs.len(),
            "order placed"
        );
        report.state = PipelineState::Placed;
        report.order_id = order_id;
        run.advance(PipelineState::Placed);

        self.record(&mut report, &chain.underlying, &order, &quotes, spread)
            .await;

        if let (Some(pct), Some(id)) = (strategy.profit_target_pct, order_id) {
            let target = ProfitTarget {
                profit_target_pct: pct,
                tick,
                fill_wait: Duration::from_secs(strategy.fill_wait_secs),
            };
            match target.place(client, &builder, &account, id, &order).await {
                Ok(outcome) => report.profit_target = Some(outcome),
                Err(e) => {
                    warn!(error = %e, "profit target not placed");
                    report.profit_target_error = Some(e.to_string());
                }
            }
        }

        report.diagnostics = run.diagnostics.clone();
        Ok(report)
    }

    async fn select_and_price(
        &self,
        run: &mut Run,
        chain: &OptionChain,
        aggregator: &mut MarketDataAggregator,
    ) -> Result<Priced> {
        let ctx = &self.ctx;
        let strategy = &ctx.strategy;
        let today = ctx
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());

        let selector = StrikeSelector::new(SelectionParams {
            target_dte: strategy.dte,
            target_delta_pct: strategy.delta,
            width: strategy.width,
            right: strategy.right,
            timeout: ctx.aggregation_timeout,
        });
        let selection = selector.select(chain, today, aggregator).await?;
        run.diagnostics.expiration = Some(selection.expiration.date);
        run.diagnostics.anchor_strike = Some(selection.anchor.price);
        run.diagnostics.anchor_delta = Some(selection.anchor_delta);
        run.diagnostics.paired_strike = selection.paired.as_ref().map(|p| p.price);
        run.advance(PipelineState::StrikesSelected);

        let symbols = selection.streamer_symbols();
        let quotes = aggregator
            .collect_quotes(&symbols, ctx.aggregation_timeout)
            .await?;
        let quote_for = |symbol: &String| {
            quotes
                .get(symbol)
                .ok_or_else(|| OptionsError::option_not_found(format!("no quote for {symbol}")))
        };

        let anchor_quote = quote_for(&symbols[0])?;
        let (estimate, paired_quote) = match symbols.get(1) {
            Some(paired) => {
                let paired_quote = quote_for(paired)?;
                (raw_mid(anchor_quote, paired_quote), Some(paired_quote))
            }
            None => (anchor_quote.mid(), None),
        };
        let tick = chain.tick_for(estimate).unwrap_or_else(|| {
            warn!(tick = %FALLBACK_TICK, "chain lists no tick sizes, using fallback");
            FALLBACK_TICK
        });
        let price = match paired_quote {
            Some(paired_quote) => price_credit(anchor_quote, paired_quote, tick)?,
            None => price_single(anchor_quote, tick)?,
        };
        run.diagnostics.tick = Some(tick);
        run.diagnostics.price = Some(price);
        info!(price = %price, tick = %tick, "spread priced");
        run.advance(PipelineState::Priced);

        Ok(Priced {
            selection,
            quotes,
            tick,
            price,
        })
    }

    async fn record(
        &self,
        report: &mut PipelineReport,
        underlying: &str,
        order: &OrderRequest,
        quotes: &HashMap<String, Quote>,
        spread: SpreadKind,
    ) {
        let (records, failures) = self
            .ctx
            .recorder
            .record_legs(underlying, &order.legs, quotes, spread)
            .await;
        report.records = records;
        report.persistence_failures = failures.len();
    }
}

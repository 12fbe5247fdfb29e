//! Delta-targeted options spread automation.
//!
//! Each run:
//! - Reuses or renews the brokerage session
//! - Streams greeks to pick the anchor strike nearest the target delta
//! - Streams quotes and prices the spread at the mid, rounded to tick
//! - Builds the order, validates it with a dry run, and optionally places it
//! - Writes one execution record per leg
//!
//! All rules are deterministic; nothing is retried except the single session
//! renewal.

pub mod aggregator;
pub mod error;
pub mod naming;
pub mod order_builder;
pub mod pipeline;
pub mod pricer;
pub mod recorder;
pub mod selector;
pub mod targets;
pub mod types;
pub mod validator;
pub use aggregator::MarketDataAggregator;
pub use error::{OptionsError, Result};
pub use naming::{strategy_name, summarize, TradeType};
pub use order_builder::OrderBuilder;
pub use pipeline::{
    Diagnostics, Pipeline, PipelineContext, PipelineFailure, PipelineReport, PipelineState,
};
pub use recorder::{ExecutionRecord, ExecutionRecorder, DEFAULT_EXECUTIONS_TABLE};
pub use selector::{SelectionParams, StrikeSelector};
pub use targets::{ProfitTarget, TargetOutcome};
pub use types::{OrderSummary, Selection, SpreadKind, ValidationResult};
pub use validator::OrderValidator;

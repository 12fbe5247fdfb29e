//! Runs the spread opening pipeline once.

use crate::wiring;
use anyhow::{Context, Result};
use clap::Args;
use rust_decimal::Decimal;
use spreadbot_core::{AppConfig, ConfigLoader, OptionRight};
use spreadbot_options::{ExecutionRecorder, Pipeline, PipelineContext, PipelineReport};
use spreadbot_tastytrade::{DxLinkConfig, DxLinkConnector};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct OpenSpreadArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Place the order after validation (overrides `strategy.dry_run`)
    #[arg(long)]
    pub live: bool,

    /// Underlying symbol
    #[arg(long)]
    pub symbol: Option<String>,

    /// Target days to expiration
    #[arg(long)]
    pub dte: Option<i64>,

    /// Target delta in percent (20 = 0.20)
    #[arg(long)]
    pub delta: Option<Decimal>,

    /// Strike width; 0 opens a single leg
    #[arg(long)]
    pub width: Option<Decimal>,

    /// Signed quantity: negative sells the anchor for a credit
    #[arg(long, allow_hyphen_values = true)]
    pub quantity: Option<i32>,

    /// Option side
    #[arg(long, value_parser = parse_right)]
    pub right: Option<OptionRight>,
}

fn parse_right(s: &str) -> std::result::Result<OptionRight, String> {
    match s.to_ascii_lowercase().as_str() {
        "put" | "p" => Ok(OptionRight::Put),
        "call" | "c" => Ok(OptionRight::Call),
        other => Err(format!("expected put or call, got {other:?}")),
    }
}

impl OpenSpreadArgs {
    /// Applies command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut AppConfig) {
        let strategy = &mut config.strategy;
        if self.live {
            strategy.dry_run = false;
        }
        if let Some(symbol) = &self.symbol {
            strategy.symbol = symbol.to_uppercase();
        }
        if let Some(dte) = self.dte {
            strategy.dte = dte;
        }
        if let Some(delta) = self.delta {
            strategy.delta = delta;
        }
        if let Some(width) = self.width {
            strategy.width = (width > Decimal::ZERO).then_some(width);
        }
        if let Some(quantity) = self.quantity {
            strategy.quantity = quantity;
        }
        if let Some(right) = self.right {
            strategy.right = right;
        }
    }
}

pub async fn run_open_spread(args: OpenSpreadArgs) -> Result<()> {
    let mut config = ConfigLoader::load_from(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    args.apply(&mut config);

    tracing::info!(
        symbol = %config.strategy.symbol,
        dte = config.strategy.dte,
        delta = %config.strategy.delta,
        width = ?config.strategy.width,
        quantity = config.strategy.quantity,
        dry_run = config.strategy.dry_run,
        "opening spread"
    );

    let session = wiring::session(&config).await?;
    let sink = wiring::record_sink(&config).await?;
    let recorder = ExecutionRecorder::new(sink, config.strategy.portfolio)
        .with_table(config.storage.executions_table.clone());
    let connector = DxLinkConnector::new(
        DxLinkConfig::default().with_keepalive_secs(config.streamer.keepalive_secs),
    );

    let ctx = PipelineContext::new(
        Arc::new(session),
        Arc::new(connector),
        recorder,
        config.strategy.clone(),
    )
    .with_account(config.tastytrade.account_number.clone())
    .with_aggregation_timeout(Duration::from_secs(
        config.streamer.aggregation_timeout_secs,
    ));

    match Pipeline::new(ctx).run().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            for line in failure.error.rejection_lines() {
                eprintln!("  {line}");
            }
            Err(failure.into())
        }
    }
}

fn print_report(report: &PipelineReport) {
    let summary = &report.summary;
    println!();
    println!("{} ({})", summary.name, report.state);
    println!("  Expiration:     {}", summary.expiration);
    println!("  Anchor delta:   {}", summary.delta);
    println!("  Price:          {} {:?}", summary.price, summary.price_effect);
    if let Some(width) = summary.spread_width {
        println!("  Width:          {width}");
    }
    if let Some(bp) = summary.buying_power_effect {
        println!("  Buying power:   {bp}");
    }
    if let Some(fees) = summary.fees {
        println!("  Fees:           {fees}");
    }
    if let Some(id) = report.order_id {
        println!("  Order id:       {id}");
    }
    println!(
        "  Records:        {} written, {} failed",
        report.records.len(),
        report.persistence_failures
    );
    if let Some(outcome) = &report.profit_target {
        println!("  Profit target:  {outcome:?}");
    }
    if let Some(error) = &report.profit_target_error {
        println!("  Profit target:  failed: {error}");
    }
}

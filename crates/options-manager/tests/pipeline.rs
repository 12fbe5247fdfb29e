//! End-to-end runs against a mocked brokerage and a scripted quote stream.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spreadbot_core::{
    EventKind, GreekSnapshot, MarketDataConnector, MarketDataStream, Portfolio, Quote,
    StrategyConfig, StreamEvent,
};
use spreadbot_data::{InMemoryRecordSink, InMemorySecretStore};
use spreadbot_options::{
    ExecutionRecorder, OptionsError, Pipeline, PipelineContext, PipelineState, SpreadKind,
};
use spreadbot_tastytrade::{
    CredentialStore, OrderAction, SessionManager, TastytradeClient, TastytradeClientConfig,
};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT: &str = "5WT00001";

// =============================================================================
// Scripted market data
// =============================================================================

/// Answers each subscription with the configured events for those symbols.
struct ScriptedStream {
    greeks: HashMap<String, Decimal>,
    quotes: HashMap<String, (Decimal, Decimal)>,
    pending: VecDeque<StreamEvent>,
}

#[async_trait]
impl MarketDataStream for ScriptedStream {
    async fn subscribe(&mut self, kind: EventKind, symbols: &[String]) -> anyhow::Result<()> {
        for symbol in symbols {
            let event = match kind {
                EventKind::Greeks => self.greeks.get(symbol).map(|delta| {
                    StreamEvent::Greeks(GreekSnapshot {
                        symbol: symbol.clone(),
                        delta: *delta,
                        computed_at: Utc::now(),
                    })
                }),
                EventKind::Quote => self.quotes.get(symbol).map(|(bid, ask)| {
                    StreamEvent::Quote(Quote {
                        symbol: symbol.clone(),
                        bid: *bid,
                        ask: *ask,
                    })
                }),
            };
            self.pending.extend(event);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, _kind: EventKind, _symbols: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> anyhow::Result<Option<StreamEvent>> {
        match self.pending.pop_front() {
            Some(event) => Ok(Some(event)),
            None => {
                std::future::pending::<()>().await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct ScriptedConnector;

#[async_trait]
impl MarketDataConnector for ScriptedConnector {
    async fn connect(&self, url: &str, token: &str) -> anyhow::Result<Box<dyn MarketDataStream>> {
        assert_eq!(url, "wss://dxlink.test/realtime");
        assert_eq!(token, "stream-tok");

        let greeks = [
            (4080, dec!(-0.03)),
            (4090, dec!(-0.05)),
            (4100, dec!(-0.10)),
            (4110, dec!(-0.14)),
            (4120, dec!(-0.18)),
            (4130, dec!(-0.25)),
            (4140, dec!(-0.31)),
            (4150, dec!(-0.35)),
            (4160, dec!(-0.42)),
        ]
        .into_iter()
        .map(|(strike, delta)| (put_streamer(strike), delta))
        .collect();

        let quotes = [
            (put_streamer(4120), (dec!(2.00), dec!(2.10))),
            (put_streamer(4100), (dec!(1.00), dec!(1.10))),
        ]
        .into_iter()
        .collect();

        Ok(Box::new(ScriptedStream {
            greeks,
            quotes,
            pending: VecDeque::new(),
        }))
    }
}

fn put_streamer(strike: u32) -> String {
    format!(".SPXW241014P{strike}")
}

// =============================================================================
// Mocked brokerage
// =============================================================================

fn chain_body() -> serde_json::Value {
    let strikes: Vec<serde_json::Value> = (4080..=4160)
        .step_by(10)
        .map(|strike| {
            serde_json::json!({
                "strike-price": format!("{strike}.0"),
                "call": format!("SPXW  241014C0{strike}000"),
                "call-streamer-symbol": format!(".SPXW241014C{strike}"),
                "put": format!("SPXW  241014P0{strike}000"),
                "put-streamer-symbol": put_streamer(strike),
            })
        })
        .collect();

    serde_json::json!({
        "data": {"items": [{
            "underlying-symbol": "SPX",
            "root-symbol": "SPX",
            "tick-sizes": [{"value": "0.05", "threshold": "3.0"}, {"value": "0.1"}],
            "expirations": [
                {
                    "expiration-date": "2024-10-14",
                    "days-to-expiration": 1,
                    "strikes": strikes
                },
                {
                    "expiration-date": "2024-10-21",
                    "days-to-expiration": 8,
                    "strikes": []
                }
            ]
        }]}
    })
}

async fn mount_session(server: &MockServer) {
    mount_login(server).await;
    Mock::given(method("GET"))
        .and(path("/option-chains/SPX/nested"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chain_body()))
        .mount(server)
        .await;
}

/// Login, validation and account lookup, without the chain.
async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "data": {"session-token": "sess-tok"}
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quote-streamer-tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"token": "stream-tok", "dxlink-url": "wss://dxlink.test/realtime"}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/validate"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customers/me/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"items": [{"account": {"account-number": ACCOUNT, "is-closed": false}}]}
        })))
        .mount(server)
        .await;
}

async fn mount_accepted_dry_run(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders/dry-run")))
        .and(body_partial_json(serde_json::json!({
            "price-effect": "Credit",
            "legs": [
                {"symbol": "SPXW  241014P04120000", "action": "Sell to Open", "quantity": 1},
                {"symbol": "SPXW  241014P04100000", "action": "Buy to Open", "quantity": 1}
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "data": {
                "order": {"id": 0, "status": "Received", "legs": []},
                "warnings": [],
                "buying-power-effect": {
                    "change-in-buying-power": "1900.0",
                    "change-in-buying-power-effect": "Debit"
                },
                "fee-calculation": {"total-fees": "1.72", "total-fees-effect": "Debit"}
            }
        })))
        .expect(1)
        .mount(server)
        .await;
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    pipeline: Pipeline,
    records: Arc<InMemoryRecordSink>,
}

async fn harness(server: &MockServer, strategy: StrategyConfig) -> Harness {
    let client = TastytradeClient::new(
        TastytradeClientConfig::default()
            .with_base_url(server.uri())
            .with_rate_limit(NonZeroU32::new(1000).unwrap()),
    )
    .unwrap();
    let secrets = InMemorySecretStore::new().with_secret(
        "credentials",
        r#"{"username": "trader", "password": "hunter2"}"#,
    );
    let session = SessionManager::connect(client, CredentialStore::new(Arc::new(secrets)))
        .await
        .unwrap();

    let records = Arc::new(InMemoryRecordSink::new());
    let recorder = ExecutionRecorder::new(records.clone(), strategy.portfolio);
    let ctx = PipelineContext::new(
        Arc::new(session),
        Arc::new(ScriptedConnector),
        recorder,
        strategy,
    )
    .with_aggregation_timeout(Duration::from_secs(5))
    .with_today(NaiveDate::from_ymd_opt(2024, 10, 13).unwrap());

    Harness {
        pipeline: Pipeline::new(ctx),
        records,
    }
}

fn strategy(dry_run: bool) -> StrategyConfig {
    StrategyConfig {
        dry_run,
        ..StrategyConfig::default()
    }
}

// ==================== Dry Run Tests ====================

#[tokio::test]
async fn test_dry_run_selects_prices_and_records() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_accepted_dry_run(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, strategy(true)).await;
    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.state, PipelineState::Validated);
    assert_eq!(report.order_id, None);
    assert_eq!(report.diagnostics.anchor_strike, Some(dec!(4120)));
    assert_eq!(report.diagnostics.paired_strike, Some(dec!(4100)));
    assert_eq!(report.diagnostics.price, Some(dec!(1.00)));
    assert_eq!(report.diagnostics.tick, Some(dec!(0.05)));
    assert_eq!(report.summary.name, "SPX Oct 14 4100/4120 Bull Put Spread");
    assert_eq!(report.summary.fees, Some(dec!(1.72)));

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.persistence_failures, 0);
    let short = &report.records[0];
    assert_eq!(short.action, OrderAction::SellToOpen);
    assert_eq!(short.spread, SpreadKind::BullPut);
    assert_eq!(short.strike, dec!(4120));
    assert_eq!(short.price, dec!(2.05));
    assert_eq!(short.quantity, 1);
    assert_eq!(short.portfolio, Portfolio::Paper);
    assert_eq!(short.leg_number, 1);
    assert_eq!(report.records[1].price, dec!(1.05));
    assert_eq!(report.records[1].leg_number, 2);

    assert_eq!(h.records.rows().await.len(), 2);
}

#[tokio::test]
async fn test_rejected_dry_run_never_places() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders/dry-run")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "Insufficient funds",
                "errors": [{"reason": "buying power"}]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, strategy(false)).await;
    let failure = h.pipeline.run().await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Rejected);
    assert_eq!(failure.last_completed, PipelineState::OrderBuilt);
    match &failure.error {
        OptionsError::ValidationRejected { message, errors } => {
            assert_eq!(message, "Insufficient funds");
            assert_eq!(errors[0].text(), "buying power");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(failure.diagnostics.order.is_some());
    assert!(h.records.rows().await.is_empty());
}

// ==================== Live Tests ====================

#[tokio::test]
async fn test_live_run_places_once_and_records() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_accepted_dry_run(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders")))
        .and(body_partial_json(serde_json::json!({
            "time-in-force": "Day",
            "order-type": "Limit",
            "price-effect": "Credit"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "data": {"order": {"id": 7, "status": "Routed", "legs": []}, "warnings": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, strategy(false)).await;
    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.state, PipelineState::Placed);
    assert_eq!(report.order_id, Some(7));
    assert!(report.profit_target.is_none());
    assert_eq!(h.records.rows().await.len(), 2);
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_missing_paired_strike_fails_after_chain() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders/dry-run")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(
        &server,
        StrategyConfig {
            width: Some(dec!(15)),
            ..strategy(true)
        },
    )
    .await;
    let failure = h.pipeline.run().await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Failed);
    assert_eq!(failure.last_completed, PipelineState::ChainFetched);
    assert!(matches!(
        failure.error,
        OptionsError::StrikeNotFound { price, .. } if price == dec!(4105)
    ));
    assert_eq!(failure.diagnostics.account.as_deref(), Some(ACCOUNT));
}

#[tokio::test]
async fn test_chain_lookup_rejection_is_failed_not_rejected() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/option-chains/SPX/nested"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "record_not_found", "message": "Could not find chain"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/accounts/{ACCOUNT}/orders/dry-run")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, strategy(true)).await;
    let failure = h.pipeline.run().await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Failed);
    assert_eq!(failure.last_completed, PipelineState::Authenticated);
    assert!(matches!(failure.error, OptionsError::Broker(_)));
    assert!(failure.error.rejection_lines().is_empty());
}

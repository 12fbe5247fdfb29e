//! DXLink websocket feed for option greeks and quotes.
//!
//! Protocol flow on connect:
//!
//! 1. `SETUP` on channel 0, answered by `AUTH_STATE UNAUTHORIZED`
//! 2. `AUTH` with the streamer token, answered by `AUTH_STATE AUTHORIZED`
//! 3. `CHANNEL_REQUEST` for a `FEED` service on channel 1
//! 4. `FEED_SETUP` requesting the `FULL` data format
//!
//! After that `FEED_SUBSCRIPTION` messages add or remove symbols and the
//! server pushes `FEED_DATA` batches. A `KEEPALIVE` is sent on channel 0
//! every `keepalive_secs`.

use crate::error::{Result, TastytradeError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use spreadbot_core::{
    EventKind, GreekSnapshot, MarketDataConnector, MarketDataStream, Quote, StreamEvent,
};
use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel used for the market data feed.
pub const FEED_CHANNEL: u64 = 1;

const CONTROL_CHANNEL: u64 = 0;
const PROTOCOL_VERSION: &str = "0.1-DXF-JS/0.3.0";

/// Streamer connection settings.
#[derive(Debug, Clone)]
pub struct DxLinkConfig {
    /// Interval between client keepalives.
    pub keepalive_secs: u64,
    /// Upper bound on the connect handshake.
    pub handshake_timeout_secs: u64,
}

impl Default for DxLinkConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            handshake_timeout_secs: 10,
        }
    }
}

impl DxLinkConfig {
    #[must_use]
    pub fn with_keepalive_secs(mut self, secs: u64) -> Self {
        self.keepalive_secs = secs.max(1);
        self
    }

    #[must_use]
    pub fn with_handshake_timeout_secs(mut self, secs: u64) -> Self {
        self.handshake_timeout_secs = secs;
        self
    }
}

// =============================================================================
// Protocol Messages
// =============================================================================

pub(crate) fn setup_message(keepalive_secs: u64) -> Value {
    json!({
        "type": "SETUP",
        "channel": CONTROL_CHANNEL,
        "version": PROTOCOL_VERSION,
        "keepaliveTimeout": keepalive_secs * 2,
        "acceptKeepaliveTimeout": keepalive_secs * 2,
    })
}

pub(crate) fn auth_message(token: &str) -> Value {
    json!({"type": "AUTH", "channel": CONTROL_CHANNEL, "token": token})
}

pub(crate) fn channel_request() -> Value {
    json!({
        "type": "CHANNEL_REQUEST",
        "channel": FEED_CHANNEL,
        "service": "FEED",
        "parameters": {"contract": "AUTO"},
    })
}

pub(crate) fn feed_setup() -> Value {
    json!({
        "type": "FEED_SETUP",
        "channel": FEED_CHANNEL,
        "acceptAggregationPeriod": 0.1,
        "acceptDataFormat": "FULL",
        "acceptEventFields": {
            "Quote": ["eventType", "eventSymbol", "bidPrice", "askPrice"],
            "Greeks": ["eventType", "eventSymbol", "delta", "time"],
        },
    })
}

pub(crate) fn feed_subscription(kind: EventKind, symbols: &[String], add: bool) -> Value {
    let entries: Vec<Value> = symbols
        .iter()
        .map(|s| json!({"type": kind.as_str(), "symbol": s}))
        .collect();
    let field = if add { "add" } else { "remove" };
    json!({"type": "FEED_SUBSCRIPTION", "channel": FEED_CHANNEL, field: entries})
}

pub(crate) fn keepalive_message() -> Value {
    json!({"type": "KEEPALIVE", "channel": CONTROL_CHANNEL})
}

// =============================================================================
// Feed Parsing
// =============================================================================

/// Numeric field as sent by the feed; `"NaN"` and missing values yield `None`.
fn decimal_field(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn timestamp_field(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

/// Converts one `FULL`-format event object.
pub(crate) fn parse_event(event: &Value) -> Option<StreamEvent> {
    let symbol = event.get("eventSymbol")?.as_str()?.to_string();
    match event.get("eventType")?.as_str()? {
        "Quote" => Some(StreamEvent::Quote(Quote {
            symbol,
            bid: decimal_field(event.get("bidPrice"))?,
            ask: decimal_field(event.get("askPrice"))?,
        })),
        "Greeks" => Some(StreamEvent::Greeks(GreekSnapshot {
            symbol,
            delta: decimal_field(event.get("delta"))?,
            computed_at: timestamp_field(event.get("time")).unwrap_or_else(Utc::now),
        })),
        _ => None,
    }
}

/// Converts the `data` array of a `FEED_DATA` message, skipping unusable events.
pub(crate) fn parse_feed_data(data: &Value) -> Vec<StreamEvent> {
    let Some(events) = data.as_array() else {
        return Vec::new();
    };
    events
        .iter()
        .filter_map(|event| {
            let parsed = parse_event(event);
            if parsed.is_none() {
                tracing::trace!(?event, "skipping incomplete feed event");
            }
            parsed
        })
        .collect()
}

fn message_type(msg: &Value) -> &str {
    msg.get("type").and_then(Value::as_str).unwrap_or("")
}

fn error_text(msg: &Value) -> String {
    let kind = msg.get("error").and_then(Value::as_str).unwrap_or("UNKNOWN");
    let text = msg.get("message").and_then(Value::as_str).unwrap_or("");
    format!("{kind}: {text}")
}

// =============================================================================
// Streamer
// =============================================================================

/// Authenticated DXLink connection with a single feed channel.
pub struct DxLinkStreamer {
    url: String,
    ws: Option<WsStream>,
    keepalive: Interval,
    buffer: VecDeque<StreamEvent>,
}

impl std::fmt::Debug for DxLinkStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DxLinkStreamer")
            .field("url", &self.url)
            .field("connected", &self.ws.is_some())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

enum Wake {
    Keepalive,
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

impl DxLinkStreamer {
    /// Connects and completes the setup, auth and channel handshake.
    ///
    /// # Errors
    /// Returns [`TastytradeError::Authentication`] if the token is refused,
    /// or [`TastytradeError::Stream`] on transport failure or timeout.
    pub async fn connect(url: &str, token: &str, config: &DxLinkConfig) -> Result<Self> {
        tracing::debug!("connecting to DXLink at {}", url);
        let (ws, response) = connect_async(url).await.map_err(|e| {
            tracing::error!(error = %e, "DXLink connection failed");
            TastytradeError::Stream(format!("failed to connect to {url}: {e}"))
        })?;
        tracing::info!(status = %response.status(), "DXLink connected");

        let period = Duration::from_secs(config.keepalive_secs.max(1));
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut streamer = Self {
            url: url.to_string(),
            ws: Some(ws),
            keepalive,
            buffer: VecDeque::new(),
        };

        let handshake = streamer.handshake(token, config.keepalive_secs);
        match tokio::time::timeout(Duration::from_secs(config.handshake_timeout_secs), handshake)
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(TastytradeError::Stream(format!(
                    "handshake timed out after {}s",
                    config.handshake_timeout_secs
                )))
            }
        }

        tracing::info!("DXLink feed channel ready");
        Ok(streamer)
    }

    async fn handshake(&mut self, token: &str, keepalive_secs: u64) -> Result<()> {
        self.send(setup_message(keepalive_secs)).await?;

        let mut auth_sent = false;
        loop {
            let msg = self.next_control().await?;
            match message_type(&msg) {
                "AUTH_STATE" => match msg.get("state").and_then(Value::as_str) {
                    Some("AUTHORIZED") => break,
                    Some("UNAUTHORIZED") if !auth_sent => {
                        self.send(auth_message(token)).await?;
                        auth_sent = true;
                    }
                    _ => {
                        return Err(TastytradeError::authentication(
                            0,
                            "streamer token refused",
                        ))
                    }
                },
                "ERROR" => return Err(TastytradeError::Stream(error_text(&msg))),
                _ => {}
            }
        }

        self.send(channel_request()).await?;
        loop {
            let msg = self.next_control().await?;
            match message_type(&msg) {
                "CHANNEL_OPENED"
                    if msg.get("channel").and_then(Value::as_u64) == Some(FEED_CHANNEL) =>
                {
                    break
                }
                "ERROR" => return Err(TastytradeError::Stream(error_text(&msg))),
                _ => {}
            }
        }

        self.send(feed_setup()).await
    }

    /// Next JSON message during the handshake.
    async fn next_control(&mut self) -> Result<Value> {
        let ws = self.connected()?;
        while let Some(frame) = ws.next().await {
            match frame? {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => break,
                _ => {}
            }
        }
        self.ws = None;
        Err(TastytradeError::Stream(
            "connection closed during handshake".to_string(),
        ))
    }

    fn connected(&mut self) -> Result<&mut WsStream> {
        self.ws
            .as_mut()
            .ok_or_else(|| TastytradeError::Stream("not connected".to_string()))
    }

    async fn send(&mut self, msg: Value) -> Result<()> {
        let ws = self.connected()?;
        ws.send(Message::Text(msg.to_string())).await?;
        Ok(())
    }

    /// Handles one text frame. Returns false when the feed channel closed.
    fn handle_text(&mut self, text: &str) -> Result<bool> {
        let msg: Value = serde_json::from_str(text)?;
        match message_type(&msg) {
            "FEED_DATA" => {
                let events = parse_feed_data(msg.get("data").unwrap_or(&Value::Null));
                tracing::trace!(count = events.len(), "feed data received");
                self.buffer.extend(events);
            }
            "CHANNEL_CLOSED" => {
                tracing::warn!("DXLink feed channel closed by server");
                return Ok(false);
            }
            "ERROR" => return Err(TastytradeError::Stream(error_text(&msg))),
            other => tracing::trace!(kind = other, "ignoring control message"),
        }
        Ok(true)
    }

    /// Returns the next buffered or received event, `None` once closed.
    ///
    /// # Errors
    /// Returns error on transport failure or a server `ERROR` message.
    pub async fn next(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Ok(Some(event));
            }

            let Some(ws) = self.ws.as_mut() else {
                return Ok(None);
            };
            let wake = tokio::select! {
                _ = self.keepalive.tick() => Wake::Keepalive,
                frame = ws.next() => Wake::Frame(frame),
            };

            match wake {
                Wake::Keepalive => {
                    self.send(keepalive_message()).await?;
                    tracing::trace!("sent keepalive");
                }
                Wake::Frame(None) | Wake::Frame(Some(Ok(Message::Close(_)))) => {
                    tracing::warn!("DXLink connection closed");
                    self.ws = None;
                }
                Wake::Frame(Some(Ok(Message::Text(text)))) => {
                    if !self.handle_text(&text)? {
                        self.ws = None;
                    }
                }
                Wake::Frame(Some(Ok(_))) => {}
                Wake::Frame(Some(Err(e))) => {
                    self.ws = None;
                    return Err(e.into());
                }
            }
        }
    }

    /// Adds `symbols` to the feed subscription for `kind`.
    ///
    /// # Errors
    /// Returns error if the connection is closed.
    pub async fn add(&mut self, kind: EventKind, symbols: &[String]) -> Result<()> {
        tracing::debug!(%kind, count = symbols.len(), "subscribing");
        self.send(feed_subscription(kind, symbols, true)).await
    }

    /// Removes `symbols` from the feed subscription for `kind`.
    ///
    /// # Errors
    /// Returns error if the connection is closed.
    pub async fn remove(&mut self, kind: EventKind, symbols: &[String]) -> Result<()> {
        tracing::debug!(%kind, count = symbols.len(), "unsubscribing");
        self.send(feed_subscription(kind, symbols, false)).await
    }

    /// Sends a close frame. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns error if the close frame cannot be sent.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.buffer.clear();
        if let Some(mut ws) = self.ws.take() {
            ws.close(None).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataStream for DxLinkStreamer {
    async fn subscribe(&mut self, kind: EventKind, symbols: &[String]) -> anyhow::Result<()> {
        Ok(self.add(kind, symbols).await?)
    }

    async fn unsubscribe(&mut self, kind: EventKind, symbols: &[String]) -> anyhow::Result<()> {
        Ok(self.remove(kind, symbols).await?)
    }

    async fn next_event(&mut self) -> anyhow::Result<Option<StreamEvent>> {
        Ok(self.next().await?)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(self.shutdown().await?)
    }
}

/// Opens [`DxLinkStreamer`] connections.
#[derive(Debug, Clone, Default)]
pub struct DxLinkConnector {
    config: DxLinkConfig,
}

impl DxLinkConnector {
    #[must_use]
    pub fn new(config: DxLinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MarketDataConnector for DxLinkConnector {
    async fn connect(&self, url: &str, token: &str) -> anyhow::Result<Box<dyn MarketDataStream>> {
        let streamer = DxLinkStreamer::connect(url, token, &self.config).await?;
        Ok(Box::new(streamer))
    }
}

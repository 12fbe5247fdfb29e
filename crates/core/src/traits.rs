use crate::events::{EventKind, StreamEvent};
use anyhow::Result;
use async_trait::async_trait;

/// A push-based market data feed.
///
/// Subscriptions are additive; events for every active subscription arrive
/// interleaved on [`MarketDataStream::next_event`].
#[async_trait]
pub trait MarketDataStream: Send {
    async fn subscribe(&mut self, kind: EventKind, symbols: &[String]) -> Result<()>;

    async fn unsubscribe(&mut self, kind: EventKind, symbols: &[String]) -> Result<()>;

    /// Next event, or `None` once the feed has closed.
    async fn next_event(&mut self) -> Result<Option<StreamEvent>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens a [`MarketDataStream`] for a streaming endpoint and token.
#[async_trait]
pub trait MarketDataConnector: Send + Sync {
    async fn connect(&self, url: &str, token: &str) -> Result<Box<dyn MarketDataStream>>;
}

/// Key-value secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns `None` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Append-only record sink keyed by record id.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn put(&self, table: &str, id: &str, record: serde_json::Value) -> Result<()>;
}

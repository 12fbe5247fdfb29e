//! Completion-gated snapshots over a market data stream.
//!
//! Each `collect` call opens one subscription, consumes events until every
//! expected instrument has reported (or the deadline passes), and always
//! releases the subscription before returning.

use crate::error::{OptionsError, Result};
use rust_decimal::Decimal;
use spreadbot_core::{EventKind, GreekSnapshot, MarketDataStream, Quote, StreamEvent};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wraps a single stream connection for the lifetime of a pipeline run.
pub struct MarketDataAggregator {
    stream: Box<dyn MarketDataStream>,
}

impl std::fmt::Debug for MarketDataAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataAggregator").finish_non_exhaustive()
    }
}

enum Outcome {
    Complete,
    TimedOut,
    Closed,
}

impl MarketDataAggregator {
    #[must_use]
    pub fn new(stream: Box<dyn MarketDataStream>) -> Self {
        Self { stream }
    }

    /// Collects the latest event per instrument until `expected` distinct
    /// instruments have reported.
    ///
    /// Events of another kind, for instruments outside `ids`, or for `skip`
    /// are ignored. A later event for the same instrument replaces the
    /// earlier one.
    ///
    /// # Errors
    /// Returns [`OptionsError::AggregationTimeout`] or
    /// [`OptionsError::StreamClosed`] with the partial map, or
    /// [`OptionsError::MarketData`] if the stream fails.
    pub async fn collect(
        &mut self,
        kind: EventKind,
        ids: &[String],
        expected: usize,
        timeout: Duration,
        skip: Option<&str>,
    ) -> Result<HashMap<String, StreamEvent>> {
        let deadline = Instant::now() + timeout;
        let wanted: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| Some(*id) != skip)
            .collect();

        self.stream
            .subscribe(kind, ids)
            .await
            .map_err(|e| OptionsError::MarketData(format!("{e:#}")))?;
        debug!(%kind, subscribed = ids.len(), expected, "collecting events");

        let mut snapshot = HashMap::new();
        let outcome = self
            .consume(kind, &wanted, expected, deadline, &mut snapshot)
            .await;

        if let Err(e) = self.stream.unsubscribe(kind, ids).await {
            warn!(%kind, error = %e, "failed to release subscription");
        }

        match outcome? {
            Outcome::Complete => {
                debug!(%kind, received = snapshot.len(), "collection complete");
                Ok(snapshot)
            }
            Outcome::TimedOut => Err(OptionsError::AggregationTimeout {
                kind,
                expected,
                partial: snapshot,
            }),
            Outcome::Closed => Err(OptionsError::StreamClosed {
                kind,
                expected,
                partial: snapshot,
            }),
        }
    }

    async fn consume(
        &mut self,
        kind: EventKind,
        wanted: &HashSet<&str>,
        expected: usize,
        deadline: Instant,
        snapshot: &mut HashMap<String, StreamEvent>,
    ) -> Result<Outcome> {
        while snapshot.len() < expected {
            let next = match tokio::time::timeout_at(deadline, self.stream.next_event()).await {
                Ok(next) => next.map_err(|e| OptionsError::MarketData(format!("{e:#}")))?,
                Err(_) => return Ok(Outcome::TimedOut),
            };
            let Some(event) = next else {
                return Ok(Outcome::Closed);
            };
            if event.kind() != kind || !wanted.contains(event.symbol()) {
                continue;
            }
            snapshot.insert(event.symbol().to_string(), event);
        }
        Ok(Outcome::Complete)
    }

    /// Latest greeks for every id in `ids` except `skip`.
    ///
    /// # Errors
    /// See [`Self::collect`].
    pub async fn collect_greeks(
        &mut self,
        ids: &[String],
        timeout: Duration,
        skip: Option<&str>,
    ) -> Result<HashMap<String, GreekSnapshot>> {
        let expected = distinct_excluding(ids, skip);
        let events = self
            .collect(EventKind::Greeks, ids, expected, timeout, skip)
            .await?;
        Ok(events
            .into_iter()
            .filter_map(|(id, event)| match event {
                StreamEvent::Greeks(g) => Some((id, g)),
                StreamEvent::Quote(_) => None,
            })
            .collect())
    }

    /// Latest quotes for every id in `ids`.
    ///
    /// # Errors
    /// See [`Self::collect`].
    pub async fn collect_quotes(
        &mut self,
        ids: &[String],
        timeout: Duration,
    ) -> Result<HashMap<String, Quote>> {
        let expected = distinct_excluding(ids, None);
        let events = self
            .collect(EventKind::Quote, ids, expected, timeout, None)
            .await?;
        Ok(events
            .into_iter()
            .filter_map(|(id, event)| match event {
                StreamEvent::Quote(q) => Some((id, q)),
                StreamEvent::Greeks(_) => None,
            })
            .collect())
    }

    /// Closes the underlying connection.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close().await {
            warn!(error = %e, "failed to close market data stream");
        }
    }
}

fn distinct_excluding(ids: &[String], skip: Option<&str>) -> usize {
    ids.iter()
        .map(String::as_str)
        .filter(|id| Some(*id) != skip)
        .collect::<HashSet<_>>()
        .len()
}

/// Delta scaled to percent, as quoted by traders.
#[must_use]
pub fn delta_pct(snapshot: &GreekSnapshot) -> Decimal {
    snapshot.delta * Decimal::ONE_HUNDRED
}

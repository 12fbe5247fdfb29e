use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kinds of market data events a stream can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Greeks,
    Quote,
}

impl EventKind {
    /// Event type name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeks => "Greeks",
            Self::Quote => "Quote",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Greeks computed for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreekSnapshot {
    pub symbol: String,
    pub delta: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Top-of-book quote for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    Greeks(GreekSnapshot),
    Quote(Quote),
}

impl StreamEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Greeks(_) => EventKind::Greeks,
            Self::Quote(_) => EventKind::Quote,
        }
    }

    /// Instrument identifier the event belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Greeks(g) => &g.symbol,
            Self::Quote(q) => &q.symbol,
        }
    }
}

//! Core domain types shared across scrapers, recorder, and monitors.

use chrono::{DateTime, Utc};

/// Expiry-interval class of a monitored market.
///
/// Each timeframe has exactly one active instrument and one output file at
/// any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M15,
    H1,
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M15, Timeframe::H1, Timeframe::H4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    /// Per-timeframe subdirectory inside a session directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Timeframe::M15 => "market_15m",
            Timeframe::H1 => "market_1h",
            Timeframe::H4 => "market_4h",
        }
    }

    /// CSV file name inside the timeframe subdirectory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Timeframe::M15 => "market_15m.csv",
            Timeframe::H1 => "market_1h.csv",
            Timeframe::H4 => "market_4h.csv",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tradable contract being monitored: a binary market with an expiry and
/// two outcome tokens.
///
/// Immutable for the duration of one monitoring run; the lifecycle supervisor
/// replaces the whole value after expiry. `market_id` is the identity key for
/// file rotation.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub market_id: String,
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
}

impl Instrument {
    /// Seconds until expiry, negative once past.
    pub fn seconds_left(&self, now: DateTime<Utc>) -> i64 {
        self.end_time.signed_duration_since(now).num_seconds()
    }
}

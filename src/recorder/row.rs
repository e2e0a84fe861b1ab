//! Turns one tick's fetched market data into CSV row cells.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::Instrument;
use crate::scrapers::clob::{OrderBook, Trade};

/// Top-of-book depth recorded per side.
pub const BOOK_DEPTH: usize = 5;
/// Cells a flattened book contributes: bid price/size then ask
/// price/size at each depth level.
pub const BOOK_CELLS: usize = BOOK_DEPTH * 4;

/// Row timestamp with millisecond precision.
pub fn row_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Current wall clock as fractional unix seconds, the unit trade
/// timestamps arrive in.
pub fn epoch_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn parse_price(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

fn format_num(v: f64) -> String {
    format!("{}", v)
}

/// Flatten the top [`BOOK_DEPTH`] levels of each side into cells,
/// bids best-first (descending price) then asks best-first (ascending
/// price). Missing levels and missing books pad with empty cells so
/// every row stays fixed-width.
pub fn book_columns(book: Option<&OrderBook>) -> Vec<String> {
    let Some(book) = book else {
        return vec![String::new(); BOOK_CELLS];
    };

    let mut bids = book.bids.clone();
    let mut asks = book.asks.clone();
    bids.sort_by(|a, b| {
        parse_price(&b.price)
            .partial_cmp(&parse_price(&a.price))
            .unwrap_or(Ordering::Equal)
    });
    asks.sort_by(|a, b| {
        parse_price(&a.price)
            .partial_cmp(&parse_price(&b.price))
            .unwrap_or(Ordering::Equal)
    });

    let mut cells = Vec::with_capacity(BOOK_CELLS);
    for side in [&bids, &asks] {
        for i in 0..BOOK_DEPTH {
            match side.get(i) {
                Some(level) => {
                    cells.push(level.price.clone());
                    cells.push(level.size.clone());
                }
                None => {
                    cells.push(String::new());
                    cells.push(String::new());
                }
            }
        }
    }
    cells
}

/// Per-token trade summary for one tick window.
#[derive(Debug, PartialEq)]
pub struct TradeColumns {
    pub last_price: String,
    pub volume: String,
    pub trades: String,
}

impl TradeColumns {
    /// Quiet tick: no price, no fills, but the volume cell still
    /// reads zero.
    fn empty() -> Self {
        Self {
            last_price: String::new(),
            volume: "0".to_string(),
            trades: String::new(),
        }
    }
}

/// Summarize the trade feed for one token. The feed is newest-first,
/// so accumulation stops at the first entry at or before `since`;
/// everything past it is older still. Prices and sizes pass through
/// in the feed's own rendering.
pub fn trade_columns(trades: &[Trade], token_id: &str, since: f64) -> TradeColumns {
    let matching: Vec<&Trade> = trades.iter().filter(|t| t.asset == token_id).collect();
    let Some(newest) = matching.first() else {
        return TradeColumns::empty();
    };

    let mut volume = 0.0;
    let mut fills = Vec::new();
    for trade in &matching {
        if trade.timestamp <= since {
            break;
        }
        volume += trade.size_value();
        fills.push(format!("{}@{}", trade.price, trade.size));
    }

    TradeColumns {
        last_price: newest.price.clone(),
        volume: format_num(volume),
        trades: fills.join("|"),
    }
}

/// Assemble one full row: timestamp, then for each side (YES first)
/// the trade summary followed by the flattened book.
pub fn build_row(
    timestamp: &str,
    instrument: &Instrument,
    yes_book: Option<&OrderBook>,
    no_book: Option<&OrderBook>,
    trades: &[Trade],
    since: f64,
) -> Vec<String> {
    let mut row = Vec::with_capacity(1 + 2 * (3 + BOOK_CELLS));
    row.push(timestamp.to_string());
    for (token_id, book) in [
        (&instrument.yes_token_id, yes_book),
        (&instrument.no_token_id, no_book),
    ] {
        let summary = trade_columns(trades, token_id, since);
        row.push(summary.last_price);
        row.push(summary.volume);
        row.push(summary.trades);
        row.extend(book_columns(book));
    }
    row
}

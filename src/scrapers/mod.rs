pub mod binance; // Binance BTCUSDT reference price (REST poll)
pub mod clob; // Polymarket CLOB order books + data-api trades
pub mod gamma; // Gamma API instrument discovery

use crate::models::{Instrument, Timeframe};
use anyhow::Result;
use async_trait::async_trait;

/// Instrument discovery collaborator.
///
/// The lifecycle supervisors only ever ask one question: "what is the
/// soonest-expiring open instrument for this timeframe right now?"
#[async_trait]
pub trait InstrumentSource: Send + Sync {
    async fn nearest(&self, timeframe: Timeframe) -> Result<Option<Instrument>>;
}

/// Per-tick market data fetchers.
///
/// All three calls are fallible-by-design: a timeout or decode failure
/// degrades that tick's data (empty result) and is never propagated.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn order_book(&self, token_id: &str) -> Option<clob::OrderBook>;
    async fn trades(&self, condition_id: &str) -> Vec<clob::Trade>;
    async fn reference_price(&self) -> Option<String>;
}

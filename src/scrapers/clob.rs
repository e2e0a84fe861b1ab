//! Polymarket CLOB order book snapshots and data-api trade history.
//!
//! Both endpoints are polled once per tick with a short timeout. Any
//! failure (network, non-2xx, decode) is logged at debug level and the
//! tick proceeds with whatever data did arrive.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{binance, MarketData};

pub const CLOB_API_BASE: &str = "https://clob.polymarket.com";
pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";

const FETCH_TIMEOUT: Duration = Duration::from_secs(2);
const TRADES_LIMIT: u32 = 50;

/// One price level as the CLOB reports it. Prices and sizes stay as
/// strings end to end so recorded rows carry the venue's own rendering.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// A trade from the data-api feed, newest first. Price and size keep
/// the feed's own rendering, like the book levels; they are only
/// parsed where arithmetic needs them.
#[derive(Debug, Clone, Deserialize)]
pub struct Trade {
    /// Token id the trade executed against.
    #[serde(default)]
    pub asset: String,
    #[serde(default, deserialize_with = "de_raw_string")]
    pub price: String,
    #[serde(default, deserialize_with = "de_raw_string")]
    pub size: String,
    /// Unix seconds; the feed has been observed sending both numbers
    /// and stringified numbers here.
    #[serde(default, deserialize_with = "de_f64_flexible")]
    pub timestamp: f64,
}

impl Trade {
    /// Size as a number, for volume accumulation.
    pub fn size_value(&self) -> f64 {
        self.size.trim().parse().unwrap_or(0.0)
    }
}

/// Accept a JSON string as-is, or a number kept in its JSON rendering.
fn de_raw_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match StringOrNum::deserialize(deserializer)? {
        StringOrNum::Str(s) => s,
        StringOrNum::Num(n) => n.to_string(),
    })
}

/// Accept a JSON number or a stringified number.
fn de_f64_flexible<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(f64),
        Str(String),
    }

    Ok(match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(v) => v,
        NumOrString::Str(s) => s.trim().parse().unwrap_or(0.0),
    })
}

/// Live HTTP implementation of [`MarketData`].
pub struct HttpMarketData {
    client: reqwest::Client,
    clob_base: String,
    data_base: String,
}

impl HttpMarketData {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            clob_base: CLOB_API_BASE.to_string(),
            data_base: DATA_API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn order_book(&self, token_id: &str) -> Option<OrderBook> {
        let url = format!("{}/book", self.clob_base);
        let resp = match self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(token_id, error = %e, "order book request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            debug!(token_id, status = %resp.status(), "order book returned non-success");
            return None;
        }
        match resp.json::<OrderBook>().await {
            Ok(book) => Some(book),
            Err(e) => {
                debug!(token_id, error = %e, "order book decode failed");
                None
            }
        }
    }

    async fn trades(&self, condition_id: &str) -> Vec<Trade> {
        let url = format!("{}/trades", self.data_base);
        let limit = TRADES_LIMIT.to_string();
        let resp = match self
            .client
            .get(&url)
            .query(&[("market", condition_id), ("limit", limit.as_str())])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(condition_id, error = %e, "trades request failed");
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            debug!(condition_id, status = %resp.status(), "trades returned non-success");
            return Vec::new();
        }
        match resp.json::<Vec<Trade>>().await {
            Ok(trades) => trades,
            Err(e) => {
                debug!(condition_id, error = %e, "trades decode failed");
                Vec::new()
            }
        }
    }

    async fn reference_price(&self) -> Option<String> {
        binance::fetch_reference_price(&self.client).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_accepts_string_and_numeric_fields() {
        let raw = r#"[
            {"asset":"tok1","price":"0.52","size":12.5,"timestamp":"1700000001"},
            {"asset":"tok1","price":0.51,"size":"3","timestamp":1700000000}
        ]"#;
        let trades: Vec<Trade> = serde_json::from_str(raw).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, "0.52");
        assert!((trades[0].timestamp - 1_700_000_001.0).abs() < 1e-6);
        assert_eq!(trades[1].size, "3");
        assert!((trades[1].size_value() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn trade_keeps_feed_rendering_of_price_and_size() {
        // Trailing zeros and float-typed sizes must survive verbatim.
        let raw = r#"{"asset":"tok1","price":"0.520","size":5.0,"timestamp":1700000000}"#;
        let trade: Trade = serde_json::from_str(raw).unwrap();
        assert_eq!(trade.price, "0.520");
        assert_eq!(trade.size, "5.0");
        assert!((trade.size_value() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn order_book_tolerates_missing_sides() {
        let book: OrderBook = serde_json::from_str(r#"{"bids":[{"price":"0.5","size":"10"}]}"#).unwrap();
        assert_eq!(book.bids.len(), 1);
        assert!(book.asks.is_empty());
    }
}

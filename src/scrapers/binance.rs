//! Binance spot ticker poll for the BTCUSDT reference price.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";

const SYMBOL: &str = "BTCUSDT";
const FETCH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Latest BTCUSDT price, kept as the string Binance sends so the
/// recorded value is byte-for-byte what the exchange reported.
pub async fn fetch_reference_price(client: &reqwest::Client) -> Option<String> {
    let url = format!("{}/api/v3/ticker/price", BINANCE_API_BASE);
    let resp = match client
        .get(&url)
        .query(&[("symbol", SYMBOL)])
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "reference price request failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        debug!(status = %resp.status(), "reference price returned non-success");
        return None;
    }
    match resp.json::<TickerPrice>().await {
        Ok(ticker) => Some(ticker.price),
        Err(e) => {
            debug!(error = %e, "reference price decode failed");
            None
        }
    }
}

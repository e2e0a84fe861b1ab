//! Polymarket bitcoin up/down market recorder.
//!
//! Supervises one monitor per timeframe (15m, 1h, 4h) plus a BTCUSDT
//! reference price poller, writing 1 Hz CSV rows into 4h-aligned
//! session directories.

pub mod models;
pub mod monitor;
pub mod recorder;
pub mod scrapers;

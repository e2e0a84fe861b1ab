//! Instrument discovery via the Polymarket Gamma API.
//!
//! One events query per discovery attempt, filtered to open bitcoin
//! markets and classified into a timeframe from slug/title keywords.
//! The Gamma payload is loosely typed (ids arrive as numbers or
//! strings, token lists as stringified JSON), so deserialization here
//! is deliberately tolerant.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::InstrumentSource;
use crate::models::{Instrument, Timeframe};

pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const EVENTS_PAGE_LIMIT: u32 = 100;

/// Keywords that exclude an event from the hourly bucket. The hourly
/// series has no marker of its own, so it is matched by elimination.
const NON_HOURLY_KEYWORDS: [&str; 6] = ["daily", "weekly", "month", "year", "4h", "quarterly"];

#[derive(Debug, Deserialize)]
struct GammaEvent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, rename = "startDate")]
    start_date: Option<String>,
    #[serde(default, rename = "endDate")]
    end_date: Option<String>,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default, rename = "conditionId")]
    condition_id: Option<String>,
    #[serde(default, rename = "clobTokenIds", deserialize_with = "de_string_vec")]
    clob_token_ids: Vec<String>,
}

/// Gamma sends `clobTokenIds` either as a JSON array or as a string
/// containing JSON-encoded array text. Accept both.
fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum VecOrString {
        Vec(Vec<String>),
        Str(String),
    }

    Ok(match Option::<VecOrString>::deserialize(deserializer)? {
        Some(VecOrString::Vec(v)) => v,
        Some(VecOrString::Str(s)) => serde_json::from_str(&s).unwrap_or_default(),
        None => Vec::new(),
    })
}

/// Classify an event into a timeframe from its slug and title, both
/// already lowercased. `None` means the event belongs to a series we
/// do not record (daily, weekly, ...).
fn classify(slug: &str, title: &str) -> Option<Timeframe> {
    if slug.contains("15m") || title.contains("15 min") {
        return Some(Timeframe::M15);
    }
    if slug.contains("4h") || title.contains("4 hour") {
        return Some(Timeframe::H4);
    }
    let long_term = NON_HOURLY_KEYWORDS
        .iter()
        .any(|kw| slug.contains(kw) || title.contains(kw));
    if long_term {
        None
    } else {
        Some(Timeframe::H1)
    }
}

fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl GammaEvent {
    /// Build an instrument from the event's first market. Events whose
    /// market carries fewer than two token ids are unusable and yield
    /// `None`.
    fn into_instrument(self, end_time: DateTime<Utc>) -> Option<Instrument> {
        let title = self.title.unwrap_or_default();
        let start_time = parse_instant(self.start_date.as_deref());
        let market = self.markets.into_iter().next()?;
        let market_id = match &market.id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let condition_id = market.condition_id?;
        let mut tokens = market.clob_token_ids.into_iter();
        let yes_token_id = tokens.next()?;
        let Some(no_token_id) = tokens.next() else {
            warn!(%market_id, %title, "market has a single token id, skipping");
            return None;
        };
        Some(Instrument {
            title,
            start_time,
            end_time,
            market_id,
            condition_id,
            yes_token_id,
            no_token_id,
        })
    }
}

/// Live [`InstrumentSource`] backed by the Gamma events endpoint.
pub struct GammaDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl GammaDiscovery {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: GAMMA_API_BASE.to_string(),
        }
    }

    async fn fetch_active_events(&self) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("limit", EVENTS_PAGE_LIMIT.to_string().as_str()),
                ("active", "true"),
                ("closed", "false"),
                ("tag_slug", "bitcoin"),
                ("order", "endDate"),
                ("ascending", "true"),
            ])
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .context("gamma events request failed")?
            .error_for_status()
            .context("gamma events returned non-success")?;
        resp.json::<Vec<GammaEvent>>()
            .await
            .context("gamma events decode failed")
    }
}

#[async_trait]
impl InstrumentSource for GammaDiscovery {
    async fn nearest(&self, timeframe: Timeframe) -> Result<Option<Instrument>> {
        let events = self.fetch_active_events().await?;
        let now = Utc::now();

        let mut best: Option<(DateTime<Utc>, GammaEvent)> = None;
        for event in events {
            let Some(end_time) = parse_instant(event.end_date.as_deref()) else {
                continue;
            };
            if end_time <= now {
                continue;
            }
            let slug = event.slug.as_deref().unwrap_or_default().to_lowercase();
            let title = event.title.as_deref().unwrap_or_default().to_lowercase();
            if classify(&slug, &title) != Some(timeframe) {
                continue;
            }
            match &best {
                Some((best_end, _)) if *best_end <= end_time => {}
                _ => best = Some((end_time, event)),
            }
        }

        let Some((end_time, event)) = best else {
            debug!(timeframe = %timeframe, "no open instrument found");
            return Ok(None);
        };
        Ok(event.into_instrument(end_time))
    }
}

//! Lifecycle supervisors: one per timeframe plus the reference price
//! poller. Each runs the discover → record-until-expiry → rediscover
//! loop forever, backing off briefly when discovery comes up empty or
//! an error surfaces.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::models::Timeframe;
use crate::recorder::files::{MarketFile, RefPriceFile};
use crate::recorder::row::{build_row, epoch_secs, row_timestamp};
use crate::recorder::session::SessionManager;
use crate::scrapers::{InstrumentSource, MarketData};

/// Timing knobs, injectable so tests can run at millisecond ticks.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Target cadence between recorded rows.
    pub tick: Duration,
    /// Backoff after an empty discovery or a failed cycle.
    pub retry: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            retry: Duration::from_secs(5),
        }
    }
}

/// How one supervision cycle ended.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The instrument ran to expiry; rediscover immediately.
    Expired,
    /// Nothing open for this timeframe right now.
    NotFound,
}

/// Records one timeframe's active instrument until it expires.
pub struct TimeframeMonitor {
    timeframe: Timeframe,
    discovery: Arc<dyn InstrumentSource>,
    data: Arc<dyn MarketData>,
    sessions: Arc<SessionManager>,
    cfg: MonitorConfig,
}

impl TimeframeMonitor {
    pub fn new(
        timeframe: Timeframe,
        discovery: Arc<dyn InstrumentSource>,
        data: Arc<dyn MarketData>,
        sessions: Arc<SessionManager>,
        cfg: MonitorConfig,
    ) -> Self {
        Self {
            timeframe,
            discovery,
            data,
            sessions,
            cfg,
        }
    }

    pub async fn run(self) {
        info!(timeframe = %self.timeframe, "👀 timeframe monitor started");
        loop {
            match self.run_once().await {
                Ok(CycleOutcome::Expired) => {}
                Ok(CycleOutcome::NotFound) => {
                    debug!(timeframe = %self.timeframe, "no instrument, retrying");
                    sleep(self.cfg.retry).await;
                }
                Err(e) => {
                    warn!(timeframe = %self.timeframe, error = %e, "cycle failed, backing off");
                    sleep(self.cfg.retry).await;
                }
            }
        }
    }

    /// One full cycle: discover the active instrument, then record a
    /// row per tick until it expires. The sleep is drift-corrected
    /// against each tick's own start so fetch latency does not stretch
    /// the cadence.
    pub async fn run_once(&self) -> Result<CycleOutcome> {
        let Some(instrument) = self.discovery.nearest(self.timeframe).await? else {
            return Ok(CycleOutcome::NotFound);
        };

        let session = self.sessions.resolve(instrument.end_time)?;
        let mut file = MarketFile::open_or_rotate(&session, self.timeframe, &instrument)?;
        info!(
            timeframe = %self.timeframe,
            market_id = %instrument.market_id,
            title = %instrument.title,
            seconds_left = instrument.seconds_left(Utc::now()),
            file = %file.path().display(),
            "✅ recording instrument"
        );

        // First window reaches one tick back so the opening row still
        // captures fills that landed just before we attached.
        let mut since = epoch_secs() - self.cfg.tick.as_secs_f64();
        while Utc::now() < instrument.end_time {
            let started = Instant::now();
            let window_start = epoch_secs();
            let stamp = row_timestamp(Utc::now());

            let (yes_book, no_book, trades) = tokio::join!(
                self.data.order_book(&instrument.yes_token_id),
                self.data.order_book(&instrument.no_token_id),
                self.data.trades(&instrument.condition_id),
            );

            let row = build_row(
                &stamp,
                &instrument,
                yes_book.as_ref(),
                no_book.as_ref(),
                &trades,
                since,
            );
            file.append_row(&row)?;
            since = window_start;

            let elapsed = started.elapsed();
            if elapsed < self.cfg.tick {
                sleep(self.cfg.tick - elapsed).await;
            }
        }

        info!(
            timeframe = %self.timeframe,
            market_id = %instrument.market_id,
            "⏱ instrument expired, rediscovering"
        );
        Ok(CycleOutcome::Expired)
    }
}

/// Appends the BTCUSDT reference price to the current session once per
/// tick. A failed fetch skips the row; the cadence never stalls.
pub struct ReferencePriceMonitor {
    data: Arc<dyn MarketData>,
    sessions: Arc<SessionManager>,
    cfg: MonitorConfig,
    output: Option<(PathBuf, RefPriceFile)>,
}

impl ReferencePriceMonitor {
    pub fn new(data: Arc<dyn MarketData>, sessions: Arc<SessionManager>, cfg: MonitorConfig) -> Self {
        Self {
            data,
            sessions,
            cfg,
            output: None,
        }
    }

    pub async fn run(mut self) {
        info!("👀 reference price monitor started");
        loop {
            let started = Instant::now();
            if let Err(e) = self.tick().await {
                warn!(error = %e, "reference price tick failed");
            }
            let elapsed = started.elapsed();
            if elapsed < self.cfg.tick {
                sleep(self.cfg.tick - elapsed).await;
            }
        }
    }

    /// One poll: re-resolve the session (it rolls every 4h), reopen
    /// the output if the session moved, append if a price came back.
    pub async fn tick(&mut self) -> Result<()> {
        let session = self.sessions.resolve(Utc::now())?;
        let stale = self
            .output
            .as_ref()
            .map_or(true, |(dir, _)| dir != &session);
        if stale {
            self.output = Some((session.clone(), RefPriceFile::open(&session)?));
        }

        if let Some(price) = self.data.reference_price().await {
            if let Some((_, file)) = self.output.as_mut() {
                file.append(&row_timestamp(Utc::now()), &price)?;
            }
        }
        Ok(())
    }
}

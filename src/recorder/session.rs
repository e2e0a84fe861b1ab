//! Session directories aligned to the 4-hour market grid.
//!
//! All writers for a given 4h window share one directory named after
//! the window's closing boundary, e.g. `session_20260830_1600`. A
//! short grace window keeps instruments that expire a few seconds
//! past the boundary in the session they belong to.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::models::Timeframe;

const GRID_SECS: i64 = 4 * 3600;
const GRACE_SECS: i64 = 60;

/// Least 4h-grid multiple at or after `instant` (unix epoch grid).
/// Sub-second residue counts as "past" an exact boundary.
pub fn align_to_grid(instant: DateTime<Utc>) -> DateTime<Utc> {
    let mut secs = instant.timestamp();
    if instant.timestamp_subsec_millis() > 0 {
        secs += 1;
    }
    let rem = secs.rem_euclid(GRID_SECS);
    let boundary = if rem == 0 { secs } else { secs + (GRID_SECS - rem) };
    DateTime::from_timestamp(boundary, 0).unwrap_or(instant)
}

struct Session {
    boundary: DateTime<Utc>,
    dir: PathBuf,
}

/// Hands out the session directory an instant belongs to, creating it
/// (with one subdirectory per timeframe) on first use. Shared across
/// all monitor tasks.
pub struct SessionManager {
    base: PathBuf,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            current: Mutex::new(None),
        }
    }

    /// Directory for `instant`. The current session is reused while
    /// the instant stays within its boundary plus grace; past that a
    /// new boundary is aligned and a fresh directory opened.
    pub fn resolve(&self, instant: DateTime<Utc>) -> Result<PathBuf> {
        let mut current = self.current.lock();
        if let Some(session) = current.as_ref() {
            if instant <= session.boundary + chrono::Duration::seconds(GRACE_SECS) {
                return Ok(session.dir.clone());
            }
        }

        let boundary = align_to_grid(instant);
        let dir = self
            .base
            .join(format!("session_{}", boundary.format("%Y%m%d_%H%M")));
        for timeframe in Timeframe::ALL {
            fs::create_dir_all(dir.join(timeframe.dir_name()))
                .with_context(|| format!("create session dir {}", dir.display()))?;
        }
        info!(session = %dir.display(), "📂 session opened");
        *current = Some(Session {
            boundary,
            dir: dir.clone(),
        });
        Ok(dir)
    }
}

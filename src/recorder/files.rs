//! CSV output files: the per-timeframe market file with its metadata
//! header, stale-file archival, and the reference price file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::models::{Instrument, Timeframe};
use crate::recorder::row::BOOK_DEPTH;

pub const REFERENCE_PRICE_FILE: &str = "btc_price_monitoring.csv";

const METADATA_LINES: usize = 8;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Minimal CSV quoting: wrap fields containing separators or quotes,
/// doubling embedded quotes.
fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Column header row: timestamp plus the trade summary and flattened
/// book for each side, YES first.
pub fn column_header() -> Vec<String> {
    let mut cols = vec!["Timestamp_UTC".to_string()];
    for side in ["YES", "NO"] {
        cols.push(format!("{side}_Last_Price"));
        cols.push(format!("{side}_Vol_1s"));
        cols.push(format!("{side}_Trades_1s"));
        for i in 1..=BOOK_DEPTH {
            cols.push(format!("{side}_Bid_{i}_Price"));
            cols.push(format!("{side}_Bid_{i}_Size"));
        }
        for i in 1..=BOOK_DEPTH {
            cols.push(format!("{side}_Ask_{i}_Price"));
            cols.push(format!("{side}_Ask_{i}_Size"));
        }
    }
    cols
}

/// Market id recorded in an existing file's metadata header, if the
/// header is present and well-formed.
fn read_market_id(path: &Path) -> Result<Option<String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    for line in reader.lines().take(METADATA_LINES) {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if let Some(id) = line.strip_prefix("Market ID,") {
            return Ok(Some(id.trim().to_string()));
        }
    }
    Ok(None)
}

/// Move a stale market file aside, named after the instrument it
/// recorded. An existing archive of the same name gets a timestamp
/// (and if needed a counter) suffix instead of being overwritten.
fn archive_stale(dir: &Path, timeframe: Timeframe, path: &Path, old_id: Option<&str>) -> Result<()> {
    let id = old_id.unwrap_or("old");
    let mut target = dir.join(format!("market_{}_{}.csv", timeframe.as_str(), id));
    if target.exists() {
        let ts = unix_now();
        target = dir.join(format!("market_{}_{}_{}.csv", timeframe.as_str(), id, ts));
        let mut n = 1;
        while target.exists() {
            target = dir.join(format!("market_{}_{}_{}_{}.csv", timeframe.as_str(), id, ts, n));
            n += 1;
        }
    }
    fs::rename(path, &target)
        .with_context(|| format!("archive {} to {}", path.display(), target.display()))?;
    info!(archived = %target.display(), "📦 archived stale market file");
    Ok(())
}

/// Append handle to one timeframe's market CSV inside a session.
pub struct MarketFile {
    path: PathBuf,
    file: File,
}

impl MarketFile {
    /// Open the timeframe's file for `instrument`, creating it with a
    /// metadata header if absent. A file left by a different
    /// instrument is archived first; an unreadable file is moved to a
    /// backup name. Rotation failures are logged and the fresh file
    /// wins.
    pub fn open_or_rotate(
        session_dir: &Path,
        timeframe: Timeframe,
        instrument: &Instrument,
    ) -> Result<Self> {
        let dir = session_dir.join(timeframe.dir_name());
        let path = dir.join(timeframe.file_name());

        if path.exists() {
            match read_market_id(&path) {
                Ok(Some(existing)) if existing == instrument.market_id => {
                    let file = OpenOptions::new()
                        .append(true)
                        .open(&path)
                        .with_context(|| format!("append to {}", path.display()))?;
                    return Ok(Self { path, file });
                }
                Ok(existing) => {
                    if let Err(e) = archive_stale(&dir, timeframe, &path, existing.as_deref()) {
                        warn!(file = %path.display(), error = %e, "archival failed, replacing in place");
                    }
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "unreadable market file, moving to backup");
                    let backup =
                        dir.join(format!("market_{}_backup_{}.csv", timeframe.as_str(), unix_now()));
                    if let Err(e) = fs::rename(&path, &backup) {
                        warn!(error = %e, "backup rename failed, replacing in place");
                    }
                }
            }
        }

        let mut file =
            File::create(&path).with_context(|| format!("create {}", path.display()))?;
        write_metadata(&mut file, timeframe, instrument)
            .with_context(|| format!("write header to {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one row and flush so a crash loses at most the row in
    /// flight.
    pub fn append_row(&mut self, cells: &[String]) -> Result<()> {
        let line = cells
            .iter()
            .map(|c| csv_field(c))
            .collect::<Vec<_>>()
            .join(",");
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.write_all(b"\n"))
            .and_then(|_| self.file.flush())
            .with_context(|| format!("append to {}", self.path.display()))
    }
}

fn write_metadata(file: &mut File, timeframe: Timeframe, instrument: &Instrument) -> Result<()> {
    let mut out = String::new();
    out.push_str("# METADATA_START\n");
    out.push_str(&format!("Market Title,{}\n", csv_field(&instrument.title)));
    out.push_str(&format!("Market ID,{}\n", csv_field(&instrument.market_id)));
    out.push_str(&format!("Timeframe,{}\n", timeframe.as_str()));
    out.push_str(&format!("YES Token ID,{}\n", csv_field(&instrument.yes_token_id)));
    out.push_str(&format!("NO Token ID,{}\n", csv_field(&instrument.no_token_id)));
    out.push_str(&format!("Start Time (UTC),{}\n", Utc::now().to_rfc3339()));
    out.push_str("# METADATA_END\n");
    out.push_str(&column_header().join(","));
    out.push('\n');
    file.write_all(out.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Append handle to a session's reference price CSV.
pub struct RefPriceFile {
    path: PathBuf,
    file: File,
}

impl RefPriceFile {
    pub fn open(session_dir: &Path) -> Result<Self> {
        let path = session_dir.join(REFERENCE_PRICE_FILE);
        let file = if path.exists() {
            OpenOptions::new()
                .append(true)
                .open(&path)
                .with_context(|| format!("append to {}", path.display()))?
        } else {
            let mut file =
                File::create(&path).with_context(|| format!("create {}", path.display()))?;
            file.write_all(b"Timestamp_UTC,BTC_Price_USDT\n")
                .and_then(|_| file.flush())
                .with_context(|| format!("write header to {}", path.display()))?;
            file
        };
        Ok(Self { path, file })
    }

    pub fn append(&mut self, timestamp: &str, price: &str) -> Result<()> {
        let line = format!("{},{}\n", csv_field(timestamp), csv_field(price));
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("append to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(market_id: &str) -> Instrument {
        Instrument {
            title: "Bitcoin Up or Down, 5PM ET".into(),
            start_time: None,
            end_time: Utc::now(),
            market_id: market_id.into(),
            condition_id: "0xcond".into(),
            yes_token_id: "yes-tok".into(),
            no_token_id: "no-tok".into(),
        }
    }

    fn session_dir() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("session_20260830_1600");
        for tf in Timeframe::ALL {
            fs::create_dir_all(dir.join(tf.dir_name())).unwrap();
        }
        (tmp, dir)
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn fresh_file_gets_metadata_and_header() {
        let (_tmp, dir) = session_dir();
        let mf = MarketFile::open_or_rotate(&dir, Timeframe::M15, &instrument("111")).unwrap();
        let lines = lines(mf.path());
        assert_eq!(lines.len(), METADATA_LINES + 1);
        assert_eq!(lines[0], "# METADATA_START");
        assert_eq!(lines[1], "Market Title,\"Bitcoin Up or Down, 5PM ET\"");
        assert_eq!(lines[2], "Market ID,111");
        assert_eq!(lines[3], "Timeframe,15m");
        assert_eq!(lines[7], "# METADATA_END");
        assert_eq!(lines[8].split(',').count(), 47);
        assert!(lines[8].starts_with("Timestamp_UTC,YES_Last_Price"));
    }

    #[test]
    fn same_instrument_appends() {
        let (_tmp, dir) = session_dir();
        let inst = instrument("111");
        let mut mf = MarketFile::open_or_rotate(&dir, Timeframe::H1, &inst).unwrap();
        mf.append_row(&["a".into(), "b".into()]).unwrap();
        drop(mf);
        let mut mf = MarketFile::open_or_rotate(&dir, Timeframe::H1, &inst).unwrap();
        mf.append_row(&["c".into(), "d".into()]).unwrap();
        let lines = lines(mf.path());
        assert_eq!(lines.len(), METADATA_LINES + 3);
        assert_eq!(lines.last().unwrap(), "c,d");
    }

    #[test]
    fn different_instrument_archives_old_file() {
        let (_tmp, dir) = session_dir();
        let mut mf = MarketFile::open_or_rotate(&dir, Timeframe::H4, &instrument("111")).unwrap();
        mf.append_row(&["old-row".into()]).unwrap();
        drop(mf);

        let mf = MarketFile::open_or_rotate(&dir, Timeframe::H4, &instrument("222")).unwrap();
        let fresh = lines(mf.path());
        assert_eq!(fresh[2], "Market ID,222");
        assert_eq!(fresh.len(), METADATA_LINES + 1);

        let archived = dir.join("market_4h").join("market_4h_111.csv");
        let old = lines(&archived);
        assert_eq!(old[2], "Market ID,111");
        assert_eq!(old.last().unwrap(), "old-row");
    }

    #[test]
    fn archive_name_collision_gets_suffix() {
        let (_tmp, dir) = session_dir();
        let tf_dir = dir.join("market_15m");
        fs::write(tf_dir.join("market_15m_111.csv"), "occupied\n").unwrap();

        let mf = MarketFile::open_or_rotate(&dir, Timeframe::M15, &instrument("111")).unwrap();
        drop(mf);
        MarketFile::open_or_rotate(&dir, Timeframe::M15, &instrument("222")).unwrap();

        // The pre-existing archive is untouched and the stale file
        // landed under a suffixed name.
        assert_eq!(fs::read_to_string(tf_dir.join("market_15m_111.csv")).unwrap(), "occupied\n");
        let suffixed = fs::read_dir(&tf_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with("market_15m_111_") && name.ends_with(".csv")
            })
            .count();
        assert_eq!(suffixed, 1);
    }

    #[test]
    fn headerless_file_is_archived_under_fallback_name() {
        let (_tmp, dir) = session_dir();
        let tf_dir = dir.join("market_1h");
        fs::write(tf_dir.join("market_1h.csv"), "not,a,market,file\n").unwrap();

        // No "Market ID" line reads as a different instrument (None),
        // which archives under the fallback name.
        MarketFile::open_or_rotate(&dir, Timeframe::H1, &instrument("333")).unwrap();
        assert!(tf_dir.join("market_1h_old.csv").exists());
        assert_eq!(lines(&tf_dir.join("market_1h.csv"))[2], "Market ID,333");
    }

    #[test]
    fn ref_price_file_headers_once_and_appends() {
        let (_tmp, dir) = session_dir();
        let mut f = RefPriceFile::open(&dir).unwrap();
        f.append("2026-08-30T16:00:00.000", "108000.50").unwrap();
        drop(f);
        let mut f = RefPriceFile::open(&dir).unwrap();
        f.append("2026-08-30T16:00:01.000", "108001.00").unwrap();

        let lines = lines(&dir.join(REFERENCE_PRICE_FILE));
        assert_eq!(lines[0], "Timestamp_UTC,BTC_Price_USDT");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "2026-08-30T16:00:01.000,108001.00");
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}

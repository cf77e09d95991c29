//! History artifacts: the terminal's CSV dumps and our exports.
//!
//! The terminal drops requested history under `OHLCV/` in its common files
//! directory; exported tables go under `Ticks/`. File names embed the symbol,
//! a frame value, and the covered span in whole Unix seconds, separated by
//! spaces.
//!
//! Stamps in the files are either `YYYY-MM-DD HH:MM:SS[.ffffff]` or raw Unix
//! seconds; both are accepted on read.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use tracing::warn;

use mtlink_core::error::LinkError;
use mtlink_core::time_util;
use mtlink_core::types::frame::format_field;
use mtlink_core::types::{Candle, FIELD_COUNT};

/// Column headers for table artifacts.
const HEADERS: [&str; 7] = ["Time", "Open", "High", "Low", "Close", "Volume", "Spread"];

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Path builder rooted at the terminal's common files directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    common: PathBuf,
}

impl ArtifactPaths {
    pub fn new(common: impl Into<PathBuf>) -> Self {
        Self {
            common: common.into(),
        }
    }

    /// Where the terminal drops a history dump. The frame travels in seconds.
    pub fn history_file(
        &self,
        symbol: &str,
        frame_secs: f64,
        start_secs: i64,
        end_secs: i64,
    ) -> PathBuf {
        self.common.join("OHLCV").join(format!(
            "{symbol} {} {start_secs} {end_secs}.csv",
            format_field(frame_secs)
        ))
    }

    /// Where an exported table goes. The frame travels in its canonical
    /// value, so tick frames show up negative.
    pub fn export_file(
        &self,
        symbol: &str,
        frame_value: f64,
        start_secs: i64,
        end_secs: i64,
    ) -> PathBuf {
        self.common.join("Ticks").join(format!(
            "{symbol} {} {start_secs} {end_secs}.csv",
            format_field(frame_value)
        ))
    }
}

// ---------------------------------------------------------------------------
// Table IO
// ---------------------------------------------------------------------------

/// Read a table artifact. Rows that fail to parse are skipped with a warning
/// so one bad line cannot sink a whole import.
pub fn read_table(path: &Path) -> Result<Vec<Candle>, LinkError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| LinkError::Store(format!("open {}: {e}", path.display())))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| LinkError::Store(format!("read {}: {e}", path.display())))?;
        match parse_row(&record) {
            Some(candle) => rows.push(candle),
            None => warn!(
                "[OHLCV] skipping unparseable row in {}: {record:?}",
                path.display()
            ),
        }
    }
    Ok(rows)
}

/// Write a table artifact, creating parent directories as needed.
pub fn write_table(path: &Path, rows: &[Candle]) -> Result<(), LinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LinkError::Store(format!("create {}: {e}", parent.display())))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| LinkError::Store(format!("create {}: {e}", path.display())))?;
    writer
        .write_record(HEADERS)
        .map_err(|e| LinkError::Store(format!("write {}: {e}", path.display())))?;
    for row in rows {
        let record = [
            format_stamp(row.stamp_us),
            row.open.to_string(),
            row.high.to_string(),
            row.low.to_string(),
            row.close.to_string(),
            row.volume.to_string(),
            row.spread.to_string(),
        ];
        writer
            .write_record(&record)
            .map_err(|e| LinkError::Store(format!("write {}: {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| LinkError::Store(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

fn parse_row(record: &csv::StringRecord) -> Option<Candle> {
    if record.len() != HEADERS.len() {
        return None;
    }
    let stamp_us = parse_stamp(record.get(0)?)?;
    let mut fields = [0.0f64; FIELD_COUNT];
    for (i, slot) in fields.iter_mut().enumerate() {
        *slot = record.get(i + 1)?.trim().parse::<f64>().ok()?;
    }
    Candle::from_fields(stamp_us, &fields)
}

/// Accepts a calendar stamp or raw Unix seconds.
fn parse_stamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp_micros());
    }
    text.parse::<f64>().ok().map(time_util::secs_to_us)
}

fn format_stamp(stamp_us: i64) -> String {
    match DateTime::from_timestamp_micros(stamp_us) {
        Some(dt) if stamp_us % time_util::US_PER_SEC == 0 => {
            dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()
        }
        Some(dt) => dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format_field(time_util::us_to_secs(stamp_us)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(stamp_us: i64) -> Candle {
        Candle {
            stamp_us,
            open: 1.1,
            high: 1.2,
            low: 1.0,
            close: 1.15,
            volume: 10.0,
            spread: 3.0,
        }
    }

    #[test]
    fn artifact_paths_embed_frame_and_span() {
        let paths = ArtifactPaths::new("/tmp/common");
        assert_eq!(
            paths.history_file("EURUSD", 300.0, 1_700_000_000, 1_700_600_000),
            PathBuf::from("/tmp/common/OHLCV/EURUSD 300 1700000000 1700600000.csv")
        );
        assert_eq!(
            paths.export_file("EURUSD", -100.0, 10, 20),
            PathBuf::from("/tmp/common/Ticks/EURUSD -100 10 20.csv")
        );
        assert_eq!(
            paths.export_file("EURUSD", 0.5, 10, 20),
            PathBuf::from("/tmp/common/Ticks/EURUSD 0.5 10 20.csv")
        );
    }

    #[test]
    fn tables_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Ticks").join("EURUSD 300 0 600.csv");
        let rows = vec![
            row(1_700_000_000_000_000),
            row(1_700_000_300_000_000),
            row(1_700_000_600_500_000),
        ];
        write_table(&path, &rows).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn reads_unix_second_stamps_and_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(
            &path,
            "Time,Open,High,Low,Close,Volume,Spread\n\
             1700000000,1.1,1.2,1.0,1.15,10,3\n\
             2023-11-14 22:13:20,1.2,1.3,1.1,1.25,9,2\n\
             not-a-stamp,1,1,1,1,1,1\n\
             1700000120,1.3,oops,1.2,1.35,8,2\n",
        )
        .unwrap();
        let rows = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stamp_us, 1_700_000_000_000_000);
        assert_eq!(rows[1].stamp_us, 1_700_000_000_000_000);
    }

    #[test]
    fn missing_file_is_a_store_error() {
        let err = read_table(Path::new("/definitely/not/here.csv"))
            .err()
            .unwrap();
        assert!(matches!(err, LinkError::Store(_)));
    }
}

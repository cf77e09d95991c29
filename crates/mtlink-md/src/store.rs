//! In-memory market data store: one candle table and one config per tracked
//! symbol.
//!
//! Tables only ever grow at the tail. A row with a stamp at or before the
//! newest stored row is stale and silently discarded, so out-of-order
//! delivery can never corrupt a table. A total row budget is shared across
//! all tracked symbols; whenever a table grows past its share, the oldest
//! rows fall off.

use std::fmt;

use ahash::AHashMap;
use tracing::{info, warn};

use mtlink_core::config::DEFAULT_MAX_TOTAL_ROWS;
use mtlink_core::error::LinkError;
use mtlink_core::types::{Candle, Timeframe};

use crate::resample;

// ---------------------------------------------------------------------------
// CandleTable
// ---------------------------------------------------------------------------

/// Stamp-ascending rows for one symbol.
#[derive(Debug, Clone, Default)]
pub struct CandleTable {
    rows: Vec<Candle>,
}

impl CandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap rows that are already stamp-ascending.
    pub(crate) fn from_rows(rows: Vec<Candle>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Candle] {
        &self.rows
    }

    pub fn last_stamp_us(&self) -> Option<i64> {
        self.rows.last().map(|row| row.stamp_us)
    }

    /// Append if strictly newer than the newest stored row. Returns whether
    /// the row was taken.
    pub fn push(&mut self, candle: Candle) -> bool {
        if self
            .rows
            .last()
            .is_some_and(|last| candle.stamp_us <= last.stamp_us)
        {
            return false;
        }
        self.rows.push(candle);
        true
    }

    pub(crate) fn drop_oldest(&mut self, count: usize) {
        let count = count.min(self.rows.len());
        self.rows.drain(..count);
    }
}

// ---------------------------------------------------------------------------
// Symbol config
// ---------------------------------------------------------------------------

/// Per-symbol settings alongside the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolConfig {
    /// Frame the table currently holds.
    pub frame: Timeframe,
    /// Set on every accepted row, cleared by [`MarketStore::take_dirty`].
    pub dirty: bool,
    /// Terminal stream slot feeding this symbol, if any.
    pub slot: Option<u32>,
}

/// Which request family a symbol change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    History,
    Stream,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::History => write!(f, "OHLCV"),
            Self::Stream => write!(f, "Ticks"),
        }
    }
}

// ---------------------------------------------------------------------------
// MarketStore
// ---------------------------------------------------------------------------

/// All tracked symbols: tables, configs, and the shared row budget.
pub struct MarketStore {
    tables: AHashMap<String, CandleTable>,
    configs: AHashMap<String, SymbolConfig>,
    row_cap: usize,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_MAX_TOTAL_ROWS)
    }

    /// Store with an explicit total row budget.
    pub fn with_cap(row_cap: usize) -> Self {
        Self {
            tables: AHashMap::new(),
            configs: AHashMap::new(),
            row_cap,
        }
    }

    /// Register a symbol at a frame, or change the frame of a tracked symbol.
    ///
    /// A new frame must be coarser than the stored one; requesting the same
    /// frame again is only allowed from a stream context, where it re-points
    /// a live feed without touching the rows. Changing to a coarser frame
    /// resamples the stored table in place. Returns the normalized symbol and
    /// parsed frame, or `None` if the request was refused.
    pub fn setup_symbol(
        &mut self,
        symbol: &str,
        frame_label: &str,
        origin: RequestKind,
    ) -> Option<(String, Timeframe)> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            warn!("[{origin}] empty symbol name");
            return None;
        }
        let frame = match Timeframe::parse(frame_label) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[{origin}] {e}");
                return None;
            }
        };

        let Some(config) = self.configs.get(&symbol) else {
            self.tables.insert(symbol.clone(), CandleTable::new());
            self.configs.insert(
                symbol.clone(),
                SymbolConfig {
                    frame,
                    dirty: false,
                    slot: None,
                },
            );
            info!("[{origin}] tracking {symbol} at {frame}");
            return Some((symbol, frame));
        };

        let prev = config.frame;
        let coarser = frame.canonical_secs() > prev.canonical_secs();
        let same = frame.canonical_secs() == prev.canonical_secs();
        if !(coarser || (same && origin == RequestKind::Stream)) {
            warn!(
                "[{origin}] {frame} would not coarsen {prev} held for {symbol}, keeping the stored table"
            );
            return None;
        }
        if coarser {
            if let Some(table) = self.tables.get_mut(&symbol) {
                let before = table.len();
                *table = resample::resample_table(frame, table);
                info!(
                    "[{origin}] resampled {symbol} from {prev} to {frame} ({before} -> {} rows)",
                    table.len()
                );
            }
        }
        if let Some(config) = self.configs.get_mut(&symbol) {
            config.frame = frame;
        }
        Some((symbol, frame))
    }

    /// Append one live observation. `Ok(true)` when the row was taken,
    /// `Ok(false)` for untracked symbols and stale stamps.
    pub fn record_point(
        &mut self,
        symbol: &str,
        stamp_us: i64,
        fields: &[f64],
    ) -> Result<bool, LinkError> {
        let Some(candle) = Candle::from_fields(stamp_us, fields) else {
            return Err(LinkError::Validation(format!(
                "data point for {symbol} carried {} fields, expected 6",
                fields.len()
            )));
        };
        let Some(table) = self.tables.get_mut(symbol) else {
            return Ok(false);
        };
        if !table.push(candle) {
            return Ok(false);
        }
        if let Some(config) = self.configs.get_mut(symbol) {
            config.dirty = true;
        }
        self.enforce_cap(symbol);
        Ok(true)
    }

    /// Append imported history rows in order, skipping everything at or
    /// before the newest stored stamp. Returns how many rows were taken, or
    /// `None` for untracked symbols.
    pub fn append_history(&mut self, symbol: &str, rows: &[Candle]) -> Option<usize> {
        let table = self.tables.get_mut(symbol)?;
        let mut appended = 0;
        for row in rows {
            if table.push(*row) {
                appended += 1;
            }
        }
        if appended > 0 {
            if let Some(config) = self.configs.get_mut(symbol) {
                config.dirty = true;
            }
        }
        self.enforce_cap(symbol);
        Some(appended)
    }

    /// Largest row count a single table may hold given how many symbols
    /// share the budget.
    pub fn per_symbol_cap(&self) -> usize {
        self.row_cap.div_ceil(self.tables.len().max(1))
    }

    fn enforce_cap(&mut self, symbol: &str) {
        let cap = self.per_symbol_cap();
        if let Some(table) = self.tables.get_mut(symbol) {
            if table.len() > cap {
                table.drop_oldest(table.len() - cap);
            }
        }
    }

    /// Point a terminal slot at a symbol. Slots are exclusive on the
    /// terminal side, so any other symbol holding this slot loses it.
    pub fn assign_slot(&mut self, symbol: &str, slot: u32) {
        for (name, config) in self.configs.iter_mut() {
            if config.slot == Some(slot) && name != symbol {
                config.slot = None;
            }
        }
        if let Some(config) = self.configs.get_mut(symbol) {
            config.slot = Some(slot);
        }
    }

    /// Clear a symbol's slot, returning what it held.
    pub fn clear_slot(&mut self, symbol: &str) -> Option<u32> {
        self.configs.get_mut(symbol).and_then(|c| c.slot.take())
    }

    /// True once per change: reads and clears the symbol's dirty flag.
    pub fn take_dirty(&mut self, symbol: &str) -> bool {
        self.configs
            .get_mut(symbol)
            .map(|c| std::mem::replace(&mut c.dirty, false))
            .unwrap_or(false)
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.configs.contains_key(symbol)
    }

    pub fn table(&self, symbol: &str) -> Option<&CandleTable> {
        self.tables.get(symbol)
    }

    pub fn config(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.configs.get(symbol)
    }

    /// Tracked symbols, sorted for stable listings.
    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.configs.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(stamp_secs: i64) -> (i64, [f64; 6]) {
        (stamp_secs * 1_000_000, [1.0, 2.0, 0.5, 1.5, 10.0, 3.0])
    }

    fn fill(store: &mut MarketStore, symbol: &str, stamps: &[i64]) {
        for &s in stamps {
            let (stamp_us, fields) = point(s);
            store.record_point(symbol, stamp_us, &fields).unwrap();
        }
    }

    #[test]
    fn setup_normalizes_and_tracks() {
        let mut store = MarketStore::new();
        let (symbol, frame) = store.setup_symbol(" eurusd ", "M5", RequestKind::History).unwrap();
        assert_eq!(symbol, "EURUSD");
        assert_eq!(frame.to_string(), "M5");
        assert!(store.is_tracked("EURUSD"));
        assert!(store.table("EURUSD").unwrap().is_empty());
        let config = store.config("EURUSD").unwrap();
        assert!(!config.dirty);
        assert_eq!(config.slot, None);
        assert_eq!(store.tracked_symbols(), vec!["EURUSD"]);
    }

    #[test]
    fn setup_rejects_bad_input() {
        let mut store = MarketStore::new();
        assert!(store.setup_symbol("", "M5", RequestKind::History).is_none());
        assert!(store.setup_symbol("EURUSD", "Q9", RequestKind::History).is_none());
        assert!(!store.is_tracked("EURUSD"));
    }

    #[test]
    fn finer_frame_is_refused() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "M5", RequestKind::History).unwrap();
        assert!(store.setup_symbol("EURUSD", "M1", RequestKind::History).is_none());
        assert!(store.setup_symbol("EURUSD", "M1", RequestKind::Stream).is_none());
        assert_eq!(store.config("EURUSD").unwrap().frame.to_string(), "M5");
    }

    #[test]
    fn equal_frame_only_allowed_from_stream() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "M5", RequestKind::History).unwrap();
        fill(&mut store, "EURUSD", &[0, 300, 600]);

        assert!(store.setup_symbol("EURUSD", "M5", RequestKind::History).is_none());
        let (_, frame) = store.setup_symbol("EURUSD", "M5", RequestKind::Stream).unwrap();
        assert_eq!(frame.to_string(), "M5");
        // Re-pointing the feed leaves the rows alone.
        assert_eq!(store.table("EURUSD").unwrap().len(), 3);
    }

    #[test]
    fn coarser_frame_resamples_in_place() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "M1", RequestKind::History).unwrap();
        fill(&mut store, "EURUSD", &[0, 60, 120, 3600, 3660]);

        store.setup_symbol("EURUSD", "H1", RequestKind::History).unwrap();
        let table = store.table("EURUSD").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].stamp_us, 0);
        assert_eq!(table.rows()[1].stamp_us, 3_600_000_000);
        assert_eq!(table.rows()[0].volume, 30.0);
        assert_eq!(store.config("EURUSD").unwrap().frame.to_string(), "H1");
    }

    #[test]
    fn coarser_frame_with_no_rows_just_updates_config() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "M5", RequestKind::History).unwrap();
        let (_, frame) = store.setup_symbol("EURUSD", "H1", RequestKind::History).unwrap();
        assert_eq!(frame.to_string(), "H1");
        assert!(store.table("EURUSD").unwrap().is_empty());
        assert_eq!(store.config("EURUSD").unwrap().frame.to_string(), "H1");
    }

    #[test]
    fn stale_points_are_discarded() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "T1", RequestKind::Stream).unwrap();
        let (stamp_us, fields) = point(100);
        assert!(store.record_point("EURUSD", stamp_us, &fields).unwrap());
        assert!(!store.record_point("EURUSD", stamp_us, &fields).unwrap());
        assert!(!store.record_point("EURUSD", stamp_us - 1, &fields).unwrap());
        assert_eq!(store.table("EURUSD").unwrap().len(), 1);
    }

    #[test]
    fn untracked_points_are_ignored() {
        let mut store = MarketStore::new();
        let (stamp_us, fields) = point(1);
        assert!(!store.record_point("GHOST", stamp_us, &fields).unwrap());
    }

    #[test]
    fn wrong_field_count_is_an_error() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "T1", RequestKind::Stream).unwrap();
        let err = store.record_point("EURUSD", 1, &[1.0, 2.0]).err().unwrap();
        assert!(matches!(err, LinkError::Validation(_)));
    }

    #[test]
    fn budget_is_shared_and_oldest_rows_fall_off() {
        let mut store = MarketStore::with_cap(10);
        store.setup_symbol("AAA", "T1", RequestKind::Stream).unwrap();
        assert_eq!(store.per_symbol_cap(), 10);
        fill(&mut store, "AAA", &(1..=12).collect::<Vec<_>>());
        assert_eq!(store.table("AAA").unwrap().len(), 10);
        assert_eq!(store.table("AAA").unwrap().rows()[0].stamp_us, 3_000_000);

        store.setup_symbol("BBB", "T1", RequestKind::Stream).unwrap();
        assert_eq!(store.per_symbol_cap(), 5);
        fill(&mut store, "BBB", &[100]);
        // AAA shrinks to its new share on its next append.
        fill(&mut store, "AAA", &[13]);
        assert_eq!(store.table("AAA").unwrap().len(), 5);
        assert_eq!(store.table("AAA").unwrap().last_stamp_us(), Some(13_000_000));
    }

    #[test]
    fn dirty_flag_reads_once() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "T1", RequestKind::Stream).unwrap();
        assert!(!store.take_dirty("EURUSD"));
        fill(&mut store, "EURUSD", &[1]);
        assert!(store.take_dirty("EURUSD"));
        assert!(!store.take_dirty("EURUSD"));
        assert!(!store.take_dirty("GHOST"));
    }

    #[test]
    fn slots_are_exclusive() {
        let mut store = MarketStore::new();
        store.setup_symbol("AAA", "T1", RequestKind::Stream).unwrap();
        store.setup_symbol("BBB", "T1", RequestKind::Stream).unwrap();
        store.assign_slot("AAA", 2);
        store.assign_slot("BBB", 2);
        assert_eq!(store.config("AAA").unwrap().slot, None);
        assert_eq!(store.config("BBB").unwrap().slot, Some(2));
        assert_eq!(store.clear_slot("BBB"), Some(2));
        assert_eq!(store.clear_slot("BBB"), None);
    }

    #[test]
    fn history_append_skips_stale_rows() {
        let mut store = MarketStore::new();
        store.setup_symbol("EURUSD", "M1", RequestKind::History).unwrap();
        fill(&mut store, "EURUSD", &[60]);

        let rows: Vec<Candle> = [0, 60, 120, 180]
            .iter()
            .map(|&s| {
                let (stamp_us, fields) = point(s);
                Candle::from_fields(stamp_us, &fields).unwrap()
            })
            .collect();
        assert_eq!(store.append_history("EURUSD", &rows), Some(2));
        assert_eq!(store.table("EURUSD").unwrap().len(), 3);
        assert!(store.take_dirty("EURUSD"));
        assert_eq!(store.append_history("GHOST", &rows), None);
    }
}

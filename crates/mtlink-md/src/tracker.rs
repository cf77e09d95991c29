//! Market data tracker: the public face of the bridge.
//!
//! A tracker owns one terminal session wired with the standard three
//! endpoints plus the shared [`MarketStore`] its receive loop fills.
//! Control-side calls and the receive loop synchronize on the store mutex.
//!
//! Download and subscribe requests are asynchronous on the terminal side.
//! The call returns once the command line is on the wire; the store fills
//! later, when the terminal answers on the reply endpoint.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use mtlink_core::codec::Command;
use mtlink_core::config::AppConfig;
use mtlink_core::error::LinkError;
use mtlink_core::link::{EndpointSpec, Role, Session, SessionConfig};
use mtlink_core::time_util;
use mtlink_core::types::Timeframe;
use mtlink_core::types::frame::{self, DOWNLOAD_FRAMES};

use crate::handler::MarketDataHandler;
use crate::history::{self, ArtifactPaths};
use crate::store::{MarketStore, RequestKind};

/// Endpoint label for the terminal's data stream.
pub const SUB_LABEL: &str = "SUB";
/// Endpoint label for outbound commands.
pub const PUSH_LABEL: &str = "PUSH";
/// Endpoint label for command replies.
pub const PULL_LABEL: &str = "PULL";

/// One terminal link plus the market data it accumulates.
pub struct MarketTracker {
    session: Session,
    store: Arc<Mutex<MarketStore>>,
    paths: ArtifactPaths,
}

impl MarketTracker {
    /// Connect the three standard endpoints and run the startup check.
    pub async fn connect(config: &AppConfig) -> Result<Self, LinkError> {
        let bridge = config.bridge();
        let store_cfg = config.store();
        let (sub_port, push_port, pull_port) = bridge.effective_ports();

        let store = Arc::new(Mutex::new(MarketStore::with_cap(
            store_cfg.effective_max_total_rows(),
        )));
        let paths = ArtifactPaths::new(store_cfg.effective_common_path());
        let handler = Arc::new(MarketDataHandler::new(Arc::clone(&store), paths.clone()));

        let mut session_config = SessionConfig::new(vec![
            EndpointSpec::new(SUB_LABEL, sub_port, Role::Receiver),
            EndpointSpec::new(PUSH_LABEL, push_port, Role::Sender),
            EndpointSpec::new(PULL_LABEL, pull_port, Role::Receiver),
        ]);
        session_config.host = bridge.effective_host();
        session_config.check_wait = bridge.effective_check_wait();
        session_config.shutdown_grace = bridge.effective_shutdown_grace();

        let session = Session::connect(session_config, handler).await?;
        Ok(Self {
            session,
            store,
            paths,
        })
    }

    /// Request a history dump. The terminal writes a CSV under the common
    /// directory and reports back on the reply endpoint, which triggers the
    /// import.
    pub fn download(&self, symbol: &str, frame_label: &str, rows: u32) -> Result<(), LinkError> {
        if !frame::download_supported(frame_label) {
            warn!("[OHLCV] frame {frame_label} is not downloadable");
            return Err(LinkError::Validation(format!(
                "history downloads support {DOWNLOAD_FRAMES:?}, not \"{frame_label}\""
            )));
        }
        let (symbol, frame) = self.setup(symbol, frame_label, RequestKind::History)?;
        let command = Command::History {
            symbol: symbol.clone(),
            frame_minutes: frame.canonical_secs() / 60.0,
            rows,
        };
        self.session.send(PUSH_LABEL, &command.render())?;
        info!("[OHLCV] requested {rows} rows of {symbol} at {frame}");
        Ok(())
    }

    /// Open a live stream into a terminal slot. Slots are exclusive, so any
    /// other symbol holding this slot loses it locally as well.
    pub fn subscribe(&self, symbol: &str, frame_label: &str, slot: u32) -> Result<(), LinkError> {
        let (symbol, frame) = {
            let mut store = self.lock_store()?;
            let Some((symbol, frame)) =
                store.setup_symbol(symbol, frame_label, RequestKind::Stream)
            else {
                return Err(LinkError::Validation(format!(
                    "cannot stream \"{symbol}\" at \"{frame_label}\""
                )));
            };
            store.assign_slot(&symbol, slot);
            (symbol, frame)
        };
        let command = Command::Stream {
            symbol: symbol.clone(),
            frame_secs: frame.canonical_secs(),
            slot,
        };
        self.session.send(PUSH_LABEL, &command.render())?;
        info!("[Ticks] streaming {symbol} at {frame} into slot {slot}");
        Ok(())
    }

    /// Stop a live stream. Untracked symbols and symbols without a slot are
    /// quietly ignored so teardown code can call this unconditionally.
    pub fn unsubscribe(&self, symbol: &str) -> Result<(), LinkError> {
        let symbol = symbol.trim().to_uppercase();
        let slot = {
            let mut store = self.lock_store()?;
            if !store.is_tracked(&symbol) {
                return Ok(());
            }
            store.clear_slot(&symbol)
        };
        let Some(slot) = slot else {
            return Ok(());
        };
        self.session
            .send(PUSH_LABEL, &Command::CancelStream { slot }.render())?;
        info!("[Ticks] released slot {slot} held by {symbol}");
        Ok(())
    }

    /// Export a window of a symbol's table to the common directory. The
    /// window is given as fractions of the table length, order-insensitive:
    /// the lower bound must sit in `[0, 1)` and the upper in `(0, 1]`.
    pub fn save(&self, symbol: &str, from: f64, to: f64) -> Result<PathBuf, LinkError> {
        if !(0.0..1.0).contains(&from) || !(to > 0.0 && to <= 1.0) {
            return Err(LinkError::Validation(format!(
                "window bounds {from} and {to} fall outside [0, 1) and (0, 1]"
            )));
        }
        let symbol = symbol.trim().to_uppercase();
        let (rows, frame, span) = {
            let store = self.lock_store()?;
            let Some(config) = store.config(&symbol) else {
                return Err(LinkError::Validation(format!("{symbol} is not tracked")));
            };
            let frame = config.frame;
            let Some(table) = store.table(&symbol) else {
                return Err(LinkError::Validation(format!("{symbol} is not tracked")));
            };
            let len = table.len();
            if len == 0 {
                return Err(LinkError::Store(format!("no rows held for {symbol}")));
            }
            let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
            let start = (lo * len as f64).round() as usize;
            let end = ((hi * len as f64).round() as usize).min(len);
            if start >= end {
                return Err(LinkError::Store(format!(
                    "window {from}..{to} selects no rows out of {len}"
                )));
            }
            let slice = &table.rows()[start..end];
            let (Some(first), Some(last)) = (slice.first(), slice.last()) else {
                return Err(LinkError::Store(format!("no rows selected for {symbol}")));
            };
            let span = (
                time_util::us_to_whole_secs(first.stamp_us),
                time_util::us_to_whole_secs(last.stamp_us),
            );
            (slice.to_vec(), frame, span)
        };
        let path = self
            .paths
            .export_file(&symbol, frame.canonical_secs(), span.0, span.1);
        history::write_table(&path, &rows)?;
        info!(
            "[Save] wrote {} rows of {symbol} to {}",
            rows.len(),
            path.display()
        );
        Ok(path)
    }

    /// Feed a saved table through the store as if it had streamed in live,
    /// with the same stale-stamp guard, dirty flag, and eviction. Returns
    /// how many rows the store accepted.
    pub fn replay(&self, symbol: &str, frame_label: &str, path: &Path) -> Result<usize, LinkError> {
        let (symbol, _) = self.setup(symbol, frame_label, RequestKind::Stream)?;
        let rows = history::read_table(path)?;
        let mut store = self.lock_store()?;
        let mut accepted = 0;
        for row in &rows {
            if store.record_point(&symbol, row.stamp_us, &row.fields())? {
                accepted += 1;
            }
        }
        info!(
            "[Ticks] replayed {accepted} of {} rows into {symbol}",
            rows.len()
        );
        Ok(accepted)
    }

    /// True once per change: whether new rows arrived for a symbol since the
    /// last call.
    pub fn take_dirty(&self, symbol: &str) -> Result<bool, LinkError> {
        let symbol = symbol.trim().to_uppercase();
        Ok(self.lock_store()?.take_dirty(&symbol))
    }

    /// Shared handle to the store for direct reads.
    pub fn store(&self) -> Arc<Mutex<MarketStore>> {
        Arc::clone(&self.store)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Tear the link down. Passing `notify_remote` tells the terminal to
    /// close its side first.
    pub async fn shutdown(&mut self, notify_remote: bool) {
        self.session.shutdown(notify_remote).await;
    }

    fn setup(
        &self,
        symbol: &str,
        frame_label: &str,
        origin: RequestKind,
    ) -> Result<(String, Timeframe), LinkError> {
        self.lock_store()?
            .setup_symbol(symbol, frame_label, origin)
            .ok_or_else(|| {
                LinkError::Validation(format!(
                    "cannot track \"{symbol}\" at \"{frame_label}\""
                ))
            })
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, MarketStore>, LinkError> {
        self.store
            .lock()
            .map_err(|_| LinkError::Store("market store lock poisoned".to_string()))
    }
}

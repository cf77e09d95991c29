//! Inbound message dispatch for the market data bridge.
//!
//! The handler runs on the receive loop and must not block on anything
//! slower than a store lock. History imports read one CSV file from the
//! terminal's common directory, which is local disk and small.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use mtlink_core::codec::{HistoryNotice, Inbound, RemoteError};
use mtlink_core::link::{HandlerError, MessageHandler};
use mtlink_core::time_util;

use crate::history::{self, ArtifactPaths};
use crate::mq_errors;
use crate::store::MarketStore;

/// Routes decoded messages into the shared [`MarketStore`].
pub struct MarketDataHandler {
    store: Arc<Mutex<MarketStore>>,
    paths: ArtifactPaths,
}

impl MarketDataHandler {
    pub fn new(store: Arc<Mutex<MarketStore>>, paths: ArtifactPaths) -> Self {
        Self { store, paths }
    }

    fn on_history_ready(
        &self,
        outcome: Result<HistoryNotice, RemoteError>,
    ) -> Result<(), HandlerError> {
        let notice = match outcome {
            Ok(notice) => notice,
            Err(err) => {
                warn!("[OHLCV] request failed: {}", describe_remote(&err));
                return Ok(());
            }
        };
        let path = self.paths.history_file(
            &notice.symbol,
            notice.frame_minutes * 60.0,
            notice.start_secs,
            notice.end_secs,
        );
        let mut rows = history::read_table(&path).map_err(|e| {
            HandlerError::Recoverable(format!("history dump for {}: {e}", notice.symbol))
        })?;
        // The newest row covers a period still forming on the terminal side.
        rows.pop();

        let mut store = self
            .store
            .lock()
            .map_err(|_| HandlerError::Fatal("market store lock poisoned".to_string()))?;
        match store.append_history(&notice.symbol, &rows) {
            Some(appended) => {
                info!(
                    "[OHLCV] imported {appended} of {} rows for {} from {}",
                    rows.len(),
                    notice.symbol,
                    path.display()
                );
                Ok(())
            }
            None => Err(HandlerError::Recoverable(format!(
                "history dump for untracked symbol {}",
                notice.symbol
            ))),
        }
    }

    fn on_stream_ack(&self, outcome: Result<String, RemoteError>) -> Result<(), HandlerError> {
        match outcome {
            Ok(symbol) => info!("[Ticks] stream live for {symbol}"),
            Err(err) => warn!("[Ticks] request failed: {}", describe_remote(&err)),
        }
        Ok(())
    }

    fn on_data_point(
        &self,
        symbol: &str,
        stamp_us: i64,
        fields: &[f64],
    ) -> Result<(), HandlerError> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| HandlerError::Fatal("market store lock poisoned".to_string()))?;
        match store.record_point(symbol, stamp_us, fields) {
            Ok(true) => {
                debug!(
                    "[Ticks] {symbol} at {}",
                    time_util::us_to_secs(stamp_us)
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(HandlerError::Recoverable(e.to_string())),
        }
    }
}

impl MessageHandler for MarketDataHandler {
    fn on_message(&self, endpoint: &str, message: Inbound) -> Result<(), HandlerError> {
        match message {
            Inbound::Check => {
                debug!("[Check] probe echo on {endpoint}");
                Ok(())
            }
            Inbound::HistoryReady(outcome) => self.on_history_ready(outcome),
            Inbound::StreamAck(outcome) => self.on_stream_ack(outcome),
            Inbound::DataPoint {
                symbol,
                stamp_us,
                fields,
            } => self.on_data_point(&symbol, stamp_us, &fields),
            Inbound::List(items) => Err(HandlerError::Recoverable(format!(
                "unhandled list message with {} items on {endpoint}",
                items.len()
            ))),
        }
    }
}

/// Human-readable remote failure, resolving the terminal's numeric code.
fn describe_remote(err: &RemoteError) -> String {
    let description = mq_errors::describe(err.code);
    match &err.symbol {
        Some(symbol) => format!("\"{symbol}\" -> {description} (code {})", err.code),
        None => format!("{description} (code {})", err.code),
    }
}

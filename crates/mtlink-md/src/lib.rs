//! # mtlink-md
//!
//! Market data layer on top of the terminal bridge.
//!
//! ## Architecture
//!
//! A [`tracker::MarketTracker`] owns one [`mtlink_core::link::Session`] and a
//! mutex-guarded [`store::MarketStore`]. The session's receive loop dispatches
//! decoded messages through [`handler::MarketDataHandler`], which writes live
//! points and imported history into the store; control-side calls (download,
//! subscribe, save) read and reconfigure the same store from the caller's
//! task.
//!
//! ## Modules
//!
//! - [`store`] — per-symbol rolling candle tables, configs, row budget
//! - [`resample`] — time-bucket and tick-count reaggregation
//! - [`handler`] — receive-loop dispatch into the store
//! - [`history`] — CSV artifacts (terminal dumps, exports) with chrono stamps
//! - [`tracker`] — the public download/subscribe/save surface
//! - [`mq_errors`] — the terminal's numeric error-code table

pub mod handler;
pub mod history;
pub mod mq_errors;
pub mod resample;
pub mod store;
pub mod tracker;

//! Core data types: timeframes and aggregated market data rows.

pub mod candle;
pub mod frame;

pub use candle::*;
pub use frame::*;

//! # mtlink-core
//!
//! Core crate for the terminal link, providing:
//!
//! - **Types** (`types`) — timeframe labels and aggregated market data rows
//! - **Configuration** (`config`) — JSON config with defaulted blocks
//! - **Error types** (`error`) — per-concern `LinkError` via thiserror
//! - **Codec** (`codec`) — outbound command lines, inbound JSON grammar
//! - **Link** (`link`) — endpoint registry, receive loop, protocol session
//! - **Time utilities** (`time_util`) — Unix-second and microsecond conversions
//! - **Logging** (`logging`) — console plus rolling-file tracing setup

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;

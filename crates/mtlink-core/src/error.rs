//! Typed error definitions for the terminal link.
//!
//! [`LinkError`] groups failures by the concern they came from, so callers
//! can tell a rejected argument from a dead socket without string matching.
//! Everything derives `std::error::Error` through `thiserror` and converts
//! into `anyhow::Error` at the binary boundary.

use thiserror::Error;

/// Domain-specific errors for the terminal link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Socket connect, read, or write error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound text that does not match the message grammar, or an outbound
    /// message that cannot be rendered.
    #[error("codec error: {0}")]
    Codec(String),

    /// Startup check failed: the remote terminal never answered.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// A caller-supplied argument was rejected before anything hit the wire.
    #[error("validation error: {0}")]
    Validation(String),

    /// Symbol table or artifact file error.
    #[error("store error: {0}")]
    Store(String),
}

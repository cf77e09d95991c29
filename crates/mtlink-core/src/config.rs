//! Configuration parsing for the terminal link.
//!
//! One JSON file configures the whole process: logging metadata, a `bridge`
//! block for the socket endpoints, and a `store` block for the market data
//! tables. Every field is optional; accessors fall back to the defaults
//! below, so an empty `{}` is a working config.
//!
//! # Example config
//!
//! ```json
//! {
//!   "mtlink": { "module_name": "mtlink", "log_path": "/tmp/log" },
//!   "bridge": {
//!     "host": "127.0.0.1",
//!     "sub_port": 65530,
//!     "push_port": 65531,
//!     "pull_port": 65532
//!   },
//!   "store": { "max_total_rows": 1000000, "common_path": "terminal_files" }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default host for the terminal sockets. The terminal side binds localhost
/// only, so anything else is almost certainly a config mistake.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port the terminal publishes data on (we receive).
pub const DEFAULT_SUB_PORT: u16 = 65530;

/// Default port the terminal pulls commands from (we send).
pub const DEFAULT_PUSH_PORT: u16 = 65531;

/// Default port the terminal pushes command replies on (we receive).
pub const DEFAULT_PULL_PORT: u16 = 65532;

/// Default wait per receiver endpoint during the startup check.
pub const DEFAULT_CHECK_WAIT_MS: u64 = 250;

/// Default grace period between the shutdown notice and socket teardown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

/// Default total row budget across all symbol tables.
pub const DEFAULT_MAX_TOTAL_ROWS: usize = 1_000_000;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "mtlink")]
    pub meta: Option<ModuleMeta>,

    /// Socket endpoint settings.
    pub bridge: Option<BridgeConfig>,

    /// Market data store settings.
    pub store: Option<StoreConfig>,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Socket endpoint settings for the bridge to the terminal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    /// Host the terminal sockets are bound on.
    pub host: Option<String>,

    /// Port for the terminal's data stream (receive side).
    pub sub_port: Option<u16>,

    /// Port for outbound commands (send side).
    pub push_port: Option<u16>,

    /// Port for command replies (receive side).
    pub pull_port: Option<u16>,

    /// Per-receiver wait during the startup check, in milliseconds.
    pub check_wait_ms: Option<u64>,

    /// Grace period before teardown during shutdown, in milliseconds.
    pub shutdown_grace_ms: Option<u64>,
}

impl BridgeConfig {
    pub fn effective_host(&self) -> String {
        self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    /// Returns the effective `(sub, push, pull)` port triple.
    pub fn effective_ports(&self) -> (u16, u16, u16) {
        (
            self.sub_port.unwrap_or(DEFAULT_SUB_PORT),
            self.push_port.unwrap_or(DEFAULT_PUSH_PORT),
            self.pull_port.unwrap_or(DEFAULT_PULL_PORT),
        )
    }

    pub fn effective_check_wait(&self) -> Duration {
        Duration::from_millis(self.check_wait_ms.unwrap_or(DEFAULT_CHECK_WAIT_MS))
    }

    pub fn effective_shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms.unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS))
    }
}

/// Market data store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Total row budget shared across all tracked symbols.
    pub max_total_rows: Option<usize>,

    /// The terminal's common files directory, where history requests land and
    /// saved tables are written.
    pub common_path: Option<String>,
}

impl StoreConfig {
    pub fn effective_max_total_rows(&self) -> usize {
        self.max_total_rows.unwrap_or(DEFAULT_MAX_TOTAL_ROWS)
    }

    pub fn effective_common_path(&self) -> PathBuf {
        PathBuf::from(self.common_path.as_deref().unwrap_or("terminal_files"))
    }
}

impl AppConfig {
    /// Returns the bridge block, or all defaults if the config omitted it.
    pub fn bridge(&self) -> BridgeConfig {
        self.bridge.clone().unwrap_or_default()
    }

    /// Returns the store block, or all defaults if the config omitted it.
    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    /// Returns the module name for log file naming.
    pub fn module_name(&self) -> String {
        self.meta
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "mtlink".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.meta.as_ref().and_then(|m| m.log_path.clone())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

//! Logging setup on the `tracing` stack.
//!
//! Console output is always on; passing a directory adds a daily-rotated
//! file named after the module. Log messages already carry their originating
//! operation in square brackets (`[Init]`, `[Check]`, `[OHLCV]`, ...), so
//! the output format stays terse: no targets, no thread ids.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Call once at program start.
///
/// `log_level` is the default filter when `RUST_LOG` is unset. `log_dir`
/// enables the rotating file output; files are named `<module_name>.log`
/// plus the date suffix the rotation adds.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file_layer = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, format!("{module_name}.log"));
        fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
}

//! Logging initialisation.
//!
//! Library code logs through the `log` facade. Hosts call [`init_logging`]
//! once at startup to install a `tracing-subscriber` formatter, which also
//! bridges `log` records. Nothing is initialised implicitly on first use.

use once_cell::sync::OnceCell;
use tracing::Level;

/// Level actually installed by the first successful call
static INSTALLED: OnceCell<Level> = OnceCell::new();

/// Install the global fmt subscriber at `level`.
///
/// Only the first call installs anything; later calls return the level that
/// is already active. If another subscriber was installed elsewhere the
/// error is logged and ignored.
pub fn init_logging(level: Level) -> Level {
    *INSTALLED.get_or_init(|| {
        let result = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .try_init();
        if let Err(err) = result {
            log::debug!("[Telemetry] Subscriber already installed: {}", err);
        }
        level
    })
}

/// Parse a CLI log level name (`error`, `warn`, `info`, `debug`, `trace`).
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

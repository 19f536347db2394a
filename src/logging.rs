use tracing::Level;
use tracing_subscriber::fmt;

use crate::settings::Settings;

/// Installs a fmt subscriber at the `[logging] level` from settings.
/// Returns `false` when logging is off or a subscriber is already installed.
pub fn init(settings: &Settings) -> bool {
    match settings.log_level {
        Some(level) => init_at(level),
        None => false,
    }
}

pub fn init_at(level: Level) -> bool {
    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .with_thread_names(level >= Level::DEBUG)
        .try_init()
        .is_ok()
}

/// Parses a `[logging] level` value; `off` or blank disables logging.
pub(crate) fn parse_level(value: &str) -> Result<Option<Level>, String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    value
        .parse::<Level>()
        .map(Some)
        .map_err(|_| format!("unknown log level '{}'", value))
}

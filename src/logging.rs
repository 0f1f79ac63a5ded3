use log::{debug, error, info, log_enabled, warn, Level, LevelFilter};

/// Initializes the logger with the `env_logger` crate.
///
/// The level is taken from `RUST_LOG`; without it only errors are shown.
pub fn init_logger() {
    // A second init (tests, embedding applications) is not an error for us.
    let _ = env_logger::try_init();
}

/// Initializes the logger with a default level that `RUST_LOG` can still
/// override.
pub fn init_logger_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

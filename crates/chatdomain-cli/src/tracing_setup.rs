//! Tracing/logging bootstrap for the command-line tool.

use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "warn,chatdomain_core=info,chatdomain_cli=info";

pub const LOG_ENV: &str = "CHATDOMAIN_LOG";
pub const LOG_FILE_ENV: &str = "CHATDOMAIN_LOG_FILE";

/// Install the global subscriber. Logs go to stderr so stdout stays pure JSON.
///
/// Filter precedence:
/// 1) `RUST_LOG`
/// 2) `CHATDOMAIN_LOG`
/// 3) internal default filter
///
/// When `CHATDOMAIN_LOG_FILE` is set, debug-level logs are also appended there.
pub fn init_tracing() {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter_from_env());

    let file_layer = env::var(LOG_FILE_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true)
                        .with_filter(LevelFilter::DEBUG),
                ),
                Err(e) => {
                    eprintln!("Warning: Failed to open log file {}: {}", path, e);
                    None
                }
            }
        });

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(filter) = env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}

//! Tracing setup for the `cmirror` binary.
//!
//! Logs go to stderr so that command output on stdout stays parseable.
//!
//! - `CMIRROR_LOG` (then `RUST_LOG`) sets the filter, `info` by default
//! - `CMIRROR_LOG_FORMAT=json` switches to JSON lines
//! - `CMIRROR_LOG_DIR` adds a daily-rotated `cmirror.log` in that directory

use std::env;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "CMIRROR_LOG";
pub const LOG_FORMAT_ENV: &str = "CMIRROR_LOG_FORMAT";
pub const LOG_DIR_ENV: &str = "CMIRROR_LOG_DIR";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let registry = Registry::default().with(build_filter(verbose));
    let file_writer = build_file_writer();

    let result = match parse_format(env::var(LOG_FORMAT_ENV).ok().as_deref()) {
        LogFormat::Json => {
            let stderr_layer = tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr);
            match file_writer {
                Some((writer, guard)) => {
                    let _ = FILE_GUARD.set(guard);
                    let file_layer = tracing_subscriber::fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(writer);
                    registry.with(stderr_layer).with(file_layer).try_init()
                }
                None => registry.with(stderr_layer).try_init(),
            }
        }
        LogFormat::Compact => {
            let stderr_layer = tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr);
            match file_writer {
                Some((writer, guard)) => {
                    let _ = FILE_GUARD.set(guard);
                    let file_layer = tracing_subscriber::fmt::layer()
                        .compact()
                        .with_ansi(false)
                        .with_writer(writer);
                    registry.with(stderr_layer).with(file_layer).try_init()
                }
                None => registry.with(stderr_layer).try_init(),
            }
        }
    };
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    let configured = env::var(LOG_ENV).or_else(|_| env::var("RUST_LOG")).ok();
    match configured.filter(|v| !v.trim().is_empty()) {
        Some(value) => EnvFilter::new(value),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    }
}

/// Log format named by `value`, compact unless it says `json`.
pub fn parse_format(value: Option<&str>) -> LogFormat {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Compact,
    }
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let dir = env::var(LOG_DIR_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    let appender = tracing_appender::rolling::daily(dir, "cmirror.log");
    Some(tracing_appender::non_blocking(appender))
}

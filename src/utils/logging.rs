use log::{LevelFilter, SetLoggerError, Level};
use env_logger::{Builder, Target};
use std::env;
use std::io::Write;

use crate::models::SyncReport;

/// Maps `-v` repetitions onto a level. Zero defers to `RUST_LOG`.
pub fn level_for_verbosity(verbosity: u8) -> Option<LevelFilter> {
    match verbosity {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn parse_level(value: &str) -> LevelFilter {
    match value.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

pub fn init_logging(verbosity: u8) -> Result<(), SetLoggerError> {
    let log_level = level_for_verbosity(verbosity).unwrap_or_else(|| {
        parse_level(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
    });

    let mut builder = Builder::new();

    builder.format(|buf, record| {
        let timestamp = buf.timestamp();
        let target = record.target();

        match record.level() {
            Level::Error | Level::Warn => {
                writeln!(buf,
                    "{} [{}] {}: {}",
                    timestamp, record.level(), target, record.args()
                )
            }
            Level::Info => {
                writeln!(buf, "{} [INFO] {}", timestamp, record.args())
            }
            Level::Debug | Level::Trace => {
                writeln!(buf,
                    "{} [{}] [{}:{}] {}: {}",
                    timestamp,
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    target,
                    record.args()
                )
            }
        }
    });

    // HTTP stack internals are noise unless explicitly asked for
    if log_level < LevelFilter::Trace {
        builder.filter_module("reqwest", LevelFilter::Warn);
        builder.filter_module("hyper", LevelFilter::Warn);
        builder.filter_module("rustls", LevelFilter::Warn);
    }

    builder.filter_level(log_level)
           .target(Target::Stderr)
           .try_init()
}

pub fn log_error_with_context(error: &anyhow::Error, context: &str) {
    log::error!("[{}] {}", context, error);

    let mut source = error.source();
    while let Some(err) = source {
        log::error!("  Caused by: {}", err);
        source = err.source();
    }
}

pub fn log_auth_event(event: &str, detail: &str) {
    log::info!("[Auth] {} {}", event, detail);
}

pub fn log_sync_summary(calendar_name: &str, report: &SyncReport, duration_ms: u64) {
    log::info!(
        "[Calendar] '{}': {} inserted, {} already present, {} leap-day skipped, {} deleted in {}ms",
        calendar_name,
        report.inserted,
        report.already_present,
        report.leap_day_skipped,
        report.deleted,
        duration_ms
    );
}

//! Tracing bootstrap. Same shape as the reference architecture's own
//! daemon/foreground split — a daily-rolling file appender when a log
//! directory is configured, compact `stderr` output otherwise — minus the
//! OTLP exporter, which this bridge has no use for.

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. When `log_dir` is set, logs go
/// to a daily-rolling file there (ANSI disabled); otherwise they go to
/// `stderr`. Returns the non-blocking writer's guard — the caller must hold
/// it for the process lifetime so buffered lines are flushed on exit.
pub fn init(log_dir: Option<&Path>, debug: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = build_env_filter(debug);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "beadbridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
            guard
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).compact();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
            guard
        }
    }
}

fn build_env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

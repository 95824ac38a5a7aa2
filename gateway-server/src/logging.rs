//! Process-wide `tracing` subscriber initialization (§10.A).
//!
//! Reads `GATEWAY_LOG`/`RUST_LOG` (default `info`) for the `EnvFilter`. Always logs to stderr;
//! additionally logs to a rolling file via `tracing-appender`'s non-blocking writer when
//! `--log-file`/`log_dir` is given. Unlike the pack's CLI (which keeps stdout clean for a single
//! reply), the Gateway is a long-running service, so console output stays on by default.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::log_format::TextWithSpanIds;

fn env_filter() -> tracing_subscriber::EnvFilter {
    let raw = std::env::var("GATEWAY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::EnvFilter::try_new(raw).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Guard that must be held for the process lifetime to keep the non-blocking file writer alive.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initializes the global subscriber. `log_dir`, when given, additionally appends
/// `gateway.log` lines there through a non-blocking rolling writer.
pub fn init(log_dir: Option<&std::path::Path>) -> LoggingGuard {
    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(TextWithSpanIds::new())
        .with_filter(env_filter());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gateway.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .event_format(TextWithSpanIds::new())
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter());
            tracing_subscriber::registry().with(console_layer).with(file_layer).init();
            LoggingGuard { _file_guard: Some(guard) }
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            LoggingGuard { _file_guard: None }
        }
    }
}

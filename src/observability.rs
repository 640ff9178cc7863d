//! Logging initialization.
//!
//! Structured logs go through `tracing`; the subscriber is configured once
//! per process from `[logging]` and `RUST_LOG`.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Human-readable logs.
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops.
///
/// Logs are written to stderr so CLI output on stdout stays parseable.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Span for a single engine lookup.
#[must_use]
pub fn lookup_span(
    operation: &'static str,
    make_id: i64,
    model_id: Option<i64>,
    year: Option<i32>,
) -> Span {
    tracing::debug_span!("lookup", op = operation, make_id, model_id, year)
}

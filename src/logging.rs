//! Logging and tracing infrastructure for lazydis.
//!
//! Structured logging using the tracing crate, with a plain text and a JSON
//! output mode. Filtering follows `RUST_LOG`.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber in `format`.
///
/// Only the first call in a process does anything. A host application that
/// already owns the global subscriber keeps it.
pub fn init_with(format: LogFormat) {
    INIT.call_once(|| {
        // exactly one of these is Some; a None layer is a no-op
        let text = (format == LogFormat::Text).then(|| {
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
        });
        let json = (format == LogFormat::Json).then(|| {
            fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
        });

        let installed = tracing_subscriber::registry()
            .with(env_filter())
            .with(text)
            .with(json)
            .try_init()
            .is_ok();
        if installed {
            info!(?format, "lazydis tracing initialized");
        } else {
            debug!("Global subscriber already set");
        }
    });
}

/// Plain text output.
pub fn init_tracing() {
    init_with(LogFormat::Text);
}

/// JSON output for structured logging.
pub fn init_tracing_json() {
    init_with(LogFormat::Json);
}

/// Macro for creating spans around fetches and identification.
#[macro_export]
macro_rules! span_trace {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

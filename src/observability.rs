//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels
//! - Spans for provider operations and user commands

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and format.
///
/// `RUST_LOG` takes precedence over `level` when set. Logs go to stderr so
/// synthesized documents written to stdout stay clean.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span constructors shared across the crate.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    use crate::scheme::SyntheticIdentity;

    /// Span for a provider operation on one synthetic document.
    #[must_use]
    pub fn provider_span(operation: &str, identity: &SyntheticIdentity) -> Span {
        info_span!(
            "provider",
            operation = %operation,
            identity = %identity,
        )
    }

    /// Span for the "view directory as file" command.
    #[must_use]
    pub fn command_span(directory: &Path) -> Span {
        info_span!(
            "view_directory_as_file",
            directory = %directory.display(),
        )
    }
}

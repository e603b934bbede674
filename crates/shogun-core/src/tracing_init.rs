//! Shared tracing/logging initialization.
//!
//! The `shogun` binary sets up `tracing_subscriber` with an env-filter and
//! optional JSON output. The runner subcommand owns stdout as its protocol
//! channel, so it logs to stderr instead.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"shogun_daemon=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = env_filter(default_filter);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialise a subscriber that writes plain lines to stderr without ANSI
/// colour codes.
///
/// Used by processes whose stdout carries the runner protocol.
pub fn init_tracing_stderr(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    )
}

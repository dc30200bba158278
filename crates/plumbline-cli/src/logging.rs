//! Logging initialization for the command-line tool.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps the `-v` count to a filter level.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Builds the filter directive used when `RUST_LOG` is unset.
pub fn default_directive(level: &str) -> String {
    format!("plumbline={level},plumbline_process={level},plumbline_odb={level}")
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// clean for command output.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str, json_format: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::debug!(
        level = %level,
        format = if json_format { "json" } else { "text" },
        "Logging initialized"
    );
}

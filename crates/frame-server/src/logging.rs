//! Log output setup

use frame_core::consts::MODE_TEXT;
use frame_core::Config;
use tracing_subscriber::EnvFilter;

/// `fatal` and `panic` have no tracing level of their own
pub fn level_directive(level: &str) -> &str {
    match level {
        "fatal" | "panic" => "error",
        "" => "info",
        other => other,
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns false when a
/// subscriber was already installed.
pub fn init(config: &Config) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true);

    let result = if config.log_mode == MODE_TEXT {
        builder.try_init()
    } else {
        builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    };
    result.is_ok()
}

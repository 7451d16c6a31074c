//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor a configured level parses.
pub const DEFAULT_LEVEL: &str = "info";

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install JSON logs with timestamps on stdout.
pub fn init(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(log_level))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        init("debug");
        init("info");
    }

    #[test]
    fn unparsable_level_falls_back() {
        let _ = filter("not a [level");
    }
}

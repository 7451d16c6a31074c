//! Logging setup shared by the service binaries.

/// Initialize process-wide logging at `log_level` unless `RUST_LOG` is set.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(log_level: &str) {
    tracing::init(log_level);
}

/// Subscriber configuration (filters, layers).
pub mod tracing;

//! Logging setup shared by every binary and test harness of the engine.

/// Initialize process-wide tracing with JSON output.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;

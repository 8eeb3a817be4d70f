//! Metrics emitted by the samples store.
//!
//! Uses the `metrics` facade; nothing is recorded unless the embedding
//! application installs a recorder.

use std::time::Duration;

/// Store operations by name and status
pub const OPERATIONS_TOTAL: &str = "spam_samples_operations_total";
/// Store operation latency
pub const OPERATION_DURATION: &str = "spam_samples_operation_duration_seconds";
/// Failed store operations
pub const ERRORS_TOTAL: &str = "spam_samples_errors_total";
/// Non-empty lines applied by imports
pub const IMPORTED_LINES_TOTAL: &str = "spam_samples_imported_lines_total";

/// Record one finished store operation
pub fn record_operation(operation: &'static str, duration: Duration, success: bool) {
    let status = if success { "success" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());
    if !success {
        metrics::counter!(ERRORS_TOTAL, "operation" => operation).increment(1);
    }
}

/// Record lines applied by an import
pub fn record_import(lines: usize) {
    metrics::counter!(IMPORTED_LINES_TOTAL).increment(lines as u64);
}

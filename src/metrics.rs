//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Write propagation (set/delete/clear batches)
//! - Applied change events by action
//! - Dropped (unparsable) events
//! - Bootstrap sync results
//! - Expiration-driven evictions
//!
//! All metrics are prefixed with `mirror_`; counters end in `_total`.

use metrics::{counter, gauge};

/// Record a write batch (set/delete/clear) outcome.
pub fn record_write(name: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("mirror_writes_total", "name" => name.to_string(), "operation" => operation.to_string(), "status" => status).increment(1);
}

/// Record a change event applied from the subscription.
pub fn record_event_applied(name: &str, action: &str) {
    counter!("mirror_events_applied_total", "name" => name.to_string(), "action" => action.to_string()).increment(1);
}

/// Record a change event dropped because it could not be parsed.
pub fn record_event_dropped(name: &str) {
    counter!("mirror_events_dropped_total", "name" => name.to_string()).increment(1);
}

/// Record a bootstrap sync outcome with the number of keys recovered.
pub fn record_bootstrap(name: &str, success: bool, keys: usize) {
    let status = if success { "success" } else { "failure" };
    counter!("mirror_bootstraps_total", "name" => name.to_string(), "status" => status).increment(1);
    if success {
        gauge!("mirror_bootstrap_keys", "name" => name.to_string()).set(keys as f64);
    }
}

/// Record an expiration-driven local eviction.
pub fn record_expiration(name: &str) {
    counter!("mirror_expirations_total", "name" => name.to_string()).increment(1);
}

/// Record the current size of a mirror.
pub fn set_mirror_size(name: &str, size: usize) {
    gauge!("mirror_size", "name" => name.to_string()).set(size as f64);
}

//! Prometheus metrics for the certificate shim
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `httpproxy_shim_reconcile_duration_seconds` (histogram): reconcile duration.
//! - `httpproxy_shim_reconcile_errors_total` (counter): reconcile errors labeled by kind.
//! - `httpproxy_shim_reconcile_outcomes_total` (counter): successful passes labeled by outcome.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for reconcile error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Error kind/category, e.g. "kube", "timeout", "invalid_object"
    pub kind: String,
}

/// Labels for reconcile outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// "applied" or the skip reason, e.g. "no_issuer"
    pub outcome: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    // 1ms .. ~32s across 16 buckets.
    Histogram::new(exponential_buckets(0.001, 2.0, 16))
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking reconcile outcomes
pub static RECONCILE_OUTCOMES_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "httpproxy_shim_reconcile_duration_seconds",
        "Duration of reconcile passes in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );

    registry.register(
        "httpproxy_shim_reconcile_errors",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );

    registry.register(
        "httpproxy_shim_reconcile_outcomes",
        "Total number of successful reconcile passes by outcome",
        RECONCILE_OUTCOMES_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(seconds: f64) {
    RECONCILE_DURATION_SECONDS.observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(kind: &str) {
    let labels = ErrorLabels {
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

/// Increment the reconcile outcome counter.
pub fn inc_reconcile_outcome(outcome: &str) {
    let labels = OutcomeLabels {
        outcome: outcome.to_string(),
    };
    RECONCILE_OUTCOMES_TOTAL.get_or_create(&labels).inc();
}

/// Render the registry in the Prometheus text exposition format
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counter_increments() {
        let labels = OutcomeLabels {
            outcome: "test_outcome_counter".to_string(),
        };
        let before = RECONCILE_OUTCOMES_TOTAL.get_or_create(&labels).get();
        inc_reconcile_outcome("test_outcome_counter");
        inc_reconcile_outcome("test_outcome_counter");
        assert_eq!(RECONCILE_OUTCOMES_TOTAL.get_or_create(&labels).get(), before + 2);
    }

    #[test]
    fn test_error_counter_increments() {
        let labels = ErrorLabels {
            kind: "test_error_counter".to_string(),
        };
        inc_reconcile_error("test_error_counter");
        assert!(RECONCILE_ERRORS_TOTAL.get_or_create(&labels).get() >= 1);
    }

    #[test]
    fn test_encoded_registry_names() {
        observe_reconcile_duration_seconds(0.01);
        inc_reconcile_outcome("applied");

        let text = encode_registry().unwrap();
        assert!(text.contains("httpproxy_shim_reconcile_duration_seconds"));
        assert!(text.contains("httpproxy_shim_reconcile_outcomes_total"));
        assert!(text.contains("outcome=\"applied\""));
        assert!(text.ends_with("# EOF\n"));
    }
}

//! Prometheus metrics for the verification service.
//!
//! Registered lazily on the default registry.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram, CounterVec, Histogram};

/// Verification tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "verification_tokens_issued_total",
        "Total number of verification tokens issued",
        &["test_type"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Failed exchanges, by stage and reason.
pub static EXCHANGE_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "verification_exchange_failures_total",
        "Total number of failed code exchanges",
        &["stage", "reason"]
    )
    .expect("Failed to register exchange_failures metric")
});

/// Time spent producing token signatures.
pub static SIGNING_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "verification_signing_latency_seconds",
        "Token signing latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register signing_latency metric")
});

/// Record an issued token.
pub fn record_token_issued(test_type: &str) {
    TOKENS_ISSUED.with_label_values(&[test_type]).inc();
}

/// Record a failed exchange.
pub fn record_exchange_failure(stage: &str, reason: &str) {
    EXCHANGE_FAILURES
        .with_label_values(&[stage, reason])
        .inc();
}

/// Record signing latency.
pub fn record_signing_latency(duration_secs: f64) {
    SIGNING_LATENCY.observe(duration_secs);
}

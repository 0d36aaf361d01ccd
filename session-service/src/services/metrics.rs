use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GATE_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static STORE_FALLBACKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT: Mutex<()> = Mutex::new(());

/// Build and register every collector. Safe to call more than once; only the
/// first call installs the globals.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;

    let request_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;

    let gate_decisions = IntCounterVec::new(
        Opts::new(
            "session_gate_decisions_total",
            "Verification gate decisions by outcome and reason",
        ),
        &["outcome", "reason"],
    )?;

    let store_fallbacks = IntCounterVec::new(
        Opts::new(
            "session_store_fallbacks_total",
            "Store failures absorbed by the fallback table",
        ),
        &["operation"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(gate_decisions.clone()))?;
    registry.register(Box::new(store_fallbacks.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = GATE_DECISIONS_TOTAL.set(gate_decisions);
    let _ = STORE_FALLBACKS_TOTAL.set(store_fallbacks);
    Ok(())
}

pub fn record_gate_decision(outcome: &str, reason: &str) {
    if let Some(counter) = GATE_DECISIONS_TOTAL.get() {
        counter.with_label_values(&[outcome, reason]).inc();
    }
}

pub fn record_store_fallback(operation: &str) {
    if let Some(counter) = STORE_FALLBACKS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_gate_decision("reject", "token_revoked");
        record_store_fallback("revocation_check");

        let text = get_metrics();
        assert!(text.contains("session_gate_decisions_total"));
        assert!(text.contains("reason=\"token_revoked\""));
        assert!(text.contains("session_store_fallbacks_total"));
    }
}

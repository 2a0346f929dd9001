//! Prometheus metrics for hedged requests.
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `hedged_requests_total` | Counter | `outcome` |
//! | `hedged_attempts_total` | Counter | `attempt`, `result` |
//! | `hedged_request_duration_seconds` | Histogram | `outcome` |
//!
//! A [`Metrics`] value owns its own registry, so every process (or test)
//! builds exactly the set it exposes.

use std::time::Duration;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests_total: CounterVec,
    attempts_total: CounterVec,
    request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("hedged_requests_total", "Requests handled, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let attempts_total = CounterVec::new(
            Opts::new(
                "hedged_attempts_total",
                "Upstream attempts, by attempt label and result",
            ),
            &["attempt", "result"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "hedged_request_duration_seconds",
                "Time from receiving a budget to producing an outcome",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
            ]),
            &["outcome"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            attempts_total,
            request_duration,
        })
    }

    pub fn record_request(&self, outcome: &str, elapsed: Duration) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.request_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// `result` is `launched`, `won`, `cancelled` or an attempt failure kind.
    pub fn record_attempt(&self, attempt: &str, result: &str) {
        self.attempts_total
            .with_label_values(&[attempt, result])
            .inc();
    }

    /// Text exposition of everything registered.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("success", Duration::from_millis(120));
        metrics.record_attempt("backup-0", "read_timeout");

        let text = metrics.render();
        assert!(text.contains("hedged_requests_total{outcome=\"success\"} 1"));
        assert!(text.contains("hedged_attempts_total{attempt=\"backup-0\",result=\"read_timeout\"} 1"));
        assert!(text.contains("hedged_request_duration_seconds_bucket"));
    }

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_request("rejected_budget", Duration::ZERO);
        assert!(!b.render().contains("rejected_budget"));
    }
}

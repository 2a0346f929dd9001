//! The single operation the service offers: fetch within a budget.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    attempt::Upstream, budget::TimeoutNormalizer, config::HedgeConfig, metrics::Metrics,
    scheduler::HedgedScheduler,
};

/// Result of one [`SmartFetch::handle`] call. Every variant is a normal
/// return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    RejectedBudget(String),
    NoAttemptSucceeded,
}

impl<T> Outcome<T> {
    /// Stable name used as a log field and metric label.
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::RejectedBudget(_) => "rejected_budget",
            Outcome::NoAttemptSucceeded => "no_attempt_succeeded",
        }
    }
}

/// Normalizes the caller's budget and races the upstream under it.
#[derive(Clone)]
pub struct SmartFetch {
    normalizer: TimeoutNormalizer,
    scheduler: HedgedScheduler,
    upstream: Arc<dyn Upstream>,
    metrics: Option<Metrics>,
}

impl SmartFetch {
    pub fn new(cfg: HedgeConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            normalizer: TimeoutNormalizer::new(&cfg),
            scheduler: HedgedScheduler::new(cfg),
            upstream,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.scheduler = self.scheduler.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Budget used when the caller does not supply one.
    pub fn default_budget_ms(&self) -> i64 {
        self.scheduler.config().default_request_timeout_ms as i64
    }

    pub async fn handle(&self, budget_ms: i64) -> Outcome<Value> {
        let start = Instant::now();
        let outcome = self.run(budget_ms).await;

        debug!(budget_ms, outcome = outcome.name(), elapsed = ?start.elapsed(), "request handled");
        if let Some(metrics) = &self.metrics {
            metrics.record_request(outcome.name(), start.elapsed());
        }
        outcome
    }

    async fn run(&self, budget_ms: i64) -> Outcome<Value> {
        let deadline = match self.normalizer.normalize(budget_ms) {
            Ok(deadline) => deadline,
            Err(e) => return Outcome::RejectedBudget(e.to_string()),
        };

        let upstream = &self.upstream;
        let result = self
            .scheduler
            .race(deadline, |timeout| {
                let upstream = Arc::clone(upstream);
                async move { upstream.fetch(timeout).await }
            })
            .await;

        match result {
            Ok((winner, payload)) => {
                debug!(%winner, "attempt won the race");
                Outcome::Success(payload)
            }
            Err(e) => {
                debug!(error = %e, "all attempts failed or timed out");
                Outcome::NoAttemptSucceeded
            }
        }
    }
}

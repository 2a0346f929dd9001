use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::{future::select_all, FutureExt};
use tokio::{
    task::{JoinError, JoinHandle},
    time::{self, Instant},
};
use tracing::debug;

use crate::{
    attempt::{AttemptLabel, AttemptState},
    budget::Deadline,
    config::HedgeConfig,
    errors::{AttemptError, HedgedError},
    metrics::Metrics,
};

#[derive(Debug, Default)]
struct AttemptStats {
    launched: u64,
    wins: u64,
    total_latency_ms: f64,
    failures: u64,
    cancelled: u64,
}

/// Snapshot of statistics for one attempt slot.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptStatsSnapshot {
    /// Number of times an attempt with this label was launched.
    pub launched: u64,
    /// Number of races this attempt won.
    pub wins: u64,
    /// Average race latency in milliseconds for winning calls.
    pub avg_latency_ms: f64,
    /// Number of attempts that failed.
    pub failures: u64,
    /// Number of attempts cancelled because the race ended without them.
    pub cancelled: u64,
}

/// One in-flight call to the upstream, owned by a single race.
///
/// Dropping it aborts the task, so a race that is itself dropped leaves
/// nothing running.
struct Attempt<T> {
    label: AttemptLabel,
    state: AttemptState,
    handle: JoinHandle<Result<T, AttemptError>>,
    value: Option<T>,
}

impl<T> Drop for Attempt<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs the staged hedged race.
///
/// One initial attempt gets the grace period to itself. If it has not
/// succeeded by then, backup attempts are fired and everything still alive
/// races for the rest of the deadline. The first success wins, ties going
/// to the attempt with the higher priority, and the rest are cancelled.
#[derive(Clone)]
pub struct HedgedScheduler {
    cfg: HedgeConfig,
    stats: Arc<Mutex<HashMap<AttemptLabel, AttemptStats>>>,
    metrics: Option<Metrics>,
}

impl HedgedScheduler {
    pub fn new(cfg: HedgeConfig) -> Self {
        let mut stats_map = HashMap::new();
        stats_map.insert(AttemptLabel::Initial, AttemptStats::default());
        for n in 0..cfg.backup_attempts {
            stats_map.insert(AttemptLabel::Backup(n), AttemptStats::default());
        }

        Self {
            cfg,
            stats: Arc::new(Mutex::new(stats_map)),
            metrics: None,
        }
    }

    /// Also report attempt outcomes to `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.cfg
    }

    /// Returns a snapshot of accumulated statistics for each attempt label.
    pub fn attempt_stats(&self) -> HashMap<AttemptLabel, AttemptStatsSnapshot> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        stats
            .iter()
            .map(|(label, s)| {
                let avg = if s.wins > 0 {
                    s.total_latency_ms / (s.wins as f64)
                } else {
                    0.0
                };

                (
                    *label,
                    AttemptStatsSnapshot {
                        launched: s.launched,
                        wins: s.wins,
                        avg_latency_ms: avg,
                        failures: s.failures,
                        cancelled: s.cancelled,
                    },
                )
            })
            .collect()
    }

    /// Races attempts produced by `f` against `deadline`.
    ///
    /// `f` is called once per launched attempt with that attempt's timeout.
    /// Attempt failures only remove the attempt from contention; the race
    /// fails with [`HedgedError::Exhausted`] when nothing succeeded in time.
    /// A panic inside an attempt is resumed on the caller.
    pub async fn race<T, F, Fut>(
        &self,
        deadline: Deadline,
        f: F,
    ) -> Result<(AttemptLabel, T), HedgedError>
    where
        T: Send + 'static,
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>> + Send + 'static,
    {
        let budget = deadline.as_duration();
        let start = Instant::now();
        let grace = self.cfg.first_request_timeout.min(budget);

        let mut attempts = vec![self.launch(AttemptLabel::Initial, grace, &f)];
        self.wait_for_success(&mut attempts, grace).await;
        if has_winner(&attempts) {
            return self.conclude(attempts, start, budget);
        }

        let remaining = budget.saturating_sub(start.elapsed());
        debug!(
            initial = ?attempts[0].state,
            ?remaining,
            backups = self.cfg.backup_attempts,
            "initial attempt did not succeed in time, launching backups"
        );

        if !remaining.is_zero() {
            for n in 0..self.cfg.backup_attempts {
                attempts.push(self.launch(AttemptLabel::Backup(n), remaining, &f));
            }
        }
        self.wait_for_success(&mut attempts, remaining).await;

        self.conclude(attempts, start, budget)
    }

    fn launch<T, F, Fut>(&self, label: AttemptLabel, timeout: Duration, f: &F) -> Attempt<T>
    where
        T: Send + 'static,
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>> + Send + 'static,
    {
        debug!(attempt = %label, stage = ?label.stage(), ?timeout, "launching attempt");
        self.record(label, "launched", |s| s.launched += 1);

        Attempt {
            label,
            state: AttemptState::Pending,
            handle: tokio::spawn(f(timeout)),
            value: None,
        }
    }

    /// Waits until some attempt has succeeded, every attempt has resolved,
    /// or `bound` elapses, whichever is first.
    async fn wait_for_success<T>(&self, attempts: &mut [Attempt<T>], bound: Duration) {
        let waiting = async {
            loop {
                let pending: Vec<usize> = attempts
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.state.is_pending())
                    .map(|(idx, _)| idx)
                    .collect();
                if pending.is_empty() {
                    return;
                }

                let (output, pos, rest) = select_all(
                    attempts
                        .iter_mut()
                        .filter(|a| a.state.is_pending())
                        .map(|a| &mut a.handle),
                )
                .await;
                drop(rest);

                self.settle(&mut attempts[pending[pos]], output);
                // Others may have finished in the same tick; resolve them
                // before choosing so the winner depends on priority alone.
                self.sweep(attempts);

                if has_winner(attempts) {
                    return;
                }
            }
        };

        let waited = time::timeout(bound, waiting).await;
        if waited.is_err() {
            self.sweep(attempts);
        }
    }

    /// Settles every attempt whose task has already finished.
    fn sweep<T>(&self, attempts: &mut [Attempt<T>]) {
        for attempt in attempts.iter_mut() {
            if !attempt.state.is_pending() || !attempt.handle.is_finished() {
                continue;
            }
            if let Some(output) = (&mut attempt.handle).now_or_never() {
                self.settle(attempt, output);
            }
        }
    }

    fn settle<T>(
        &self,
        attempt: &mut Attempt<T>,
        output: Result<Result<T, AttemptError>, JoinError>,
    ) {
        match output {
            Ok(Ok(value)) => {
                if attempt.state.transition(AttemptState::Succeeded) {
                    attempt.value = Some(value);
                }
            }
            Ok(Err(e)) => {
                if attempt.state.transition(AttemptState::Failed) {
                    debug!(attempt = %attempt.label, kind = e.kind(), error = %e, "attempt failed");
                    self.record(attempt.label, e.kind(), |s| s.failures += 1);
                }
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {
                attempt.state.transition(AttemptState::Cancelled);
            }
        }
    }

    /// Cancels whatever is still pending and picks the winner in priority
    /// order.
    fn conclude<T>(
        &self,
        mut attempts: Vec<Attempt<T>>,
        start: Instant,
        budget: Duration,
    ) -> Result<(AttemptLabel, T), HedgedError> {
        for attempt in attempts.iter_mut() {
            debug!(attempt = %attempt.label, state = ?attempt.state, "attempt status at race end");
            if attempt.state.transition(AttemptState::Cancelled) {
                attempt.handle.abort();
                self.record(attempt.label, "cancelled", |s| s.cancelled += 1);
            }
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let winner = attempts
            .iter_mut()
            .find_map(|a| a.value.take().map(|value| (a.label, value)));

        match winner {
            Some((label, value)) => {
                self.record(label, "won", |s| {
                    s.wins += 1;
                    s.total_latency_ms += elapsed_ms;
                });
                Ok((label, value))
            }
            None => {
                debug!(elapsed_ms, "no attempt succeeded");
                Err(HedgedError::Exhausted(budget))
            }
        }
    }

    fn record(&self, label: AttemptLabel, result: &str, update: impl FnOnce(&mut AttemptStats)) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            update(stats.entry(label).or_default());
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(&label.to_string(), result);
        }
    }
}

fn has_winner<T>(attempts: &[Attempt<T>]) -> bool {
    attempts
        .iter()
        .any(|a| a.state == AttemptState::Succeeded)
}

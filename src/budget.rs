//! Turning a caller's millisecond budget into the deadline a race runs under.

use std::time::Duration;

use crate::{config::HedgeConfig, errors::BudgetError};

/// Decimal places kept when converting a budget into deadline seconds.
const DEADLINE_PRECISION: i32 = 5;

/// Safety-adjusted time allowance for a single race.
///
/// Always positive and never larger than the budget it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Deadline(f64);

impl Deadline {
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.0)
    }
}

impl From<Deadline> for Duration {
    fn from(deadline: Deadline) -> Self {
        deadline.as_duration()
    }
}

/// Validates budgets and applies the safety coefficient.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutNormalizer {
    minimal_safe_timeout_ms: u64,
    safety_coefficient: f64,
}

impl TimeoutNormalizer {
    pub fn new(cfg: &HedgeConfig) -> Self {
        Self {
            minimal_safe_timeout_ms: cfg.minimal_safe_timeout_ms,
            safety_coefficient: cfg.safety_coefficient,
        }
    }

    /// Computes `round(budget_ms / 1000 * coefficient, 5)` seconds.
    ///
    /// Budgets below the configured minimum (negative ones included) are
    /// rejected, as is any result outside `(0, budget]`, which only a bad
    /// coefficient can produce.
    pub fn normalize(&self, budget_ms: i64) -> Result<Deadline, BudgetError> {
        let below_minimum = BudgetError::BelowMinimum {
            budget_ms,
            minimum_ms: self.minimal_safe_timeout_ms,
        };

        if budget_ms < 0 || (budget_ms as u64) < self.minimal_safe_timeout_ms {
            return Err(below_minimum);
        }

        let budget_secs = budget_ms as f64 / 1000.0;
        let secs = round_to(budget_secs * self.safety_coefficient);
        if !(secs > 0.0 && secs <= budget_secs) {
            return Err(BudgetError::DeadlineOutOfRange {
                budget_ms,
                coefficient: self.safety_coefficient.to_string(),
            });
        }

        Ok(Deadline(secs))
    }
}

fn round_to(value: f64) -> f64 {
    let scale = 10f64.powi(DEADLINE_PRECISION);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TimeoutNormalizer {
        TimeoutNormalizer::new(&HedgeConfig::default())
    }

    #[test]
    fn applies_safety_coefficient() {
        assert_eq!(normalizer().normalize(1000).unwrap().as_secs_f64(), 0.95);
        assert_eq!(normalizer().normalize(300).unwrap().as_secs_f64(), 0.285);
        assert_eq!(normalizer().normalize(1234).unwrap().as_secs_f64(), 1.1723);
    }

    #[test]
    fn rounds_to_five_decimals() {
        let n = TimeoutNormalizer::new(&HedgeConfig {
            safety_coefficient: 0.333333333,
            ..HedgeConfig::default()
        });
        assert_eq!(n.normalize(1000).unwrap().as_secs_f64(), 0.33333);
    }

    #[test]
    fn is_deterministic() {
        let n = normalizer();
        for budget in [300, 301, 999, 1000, 60_000] {
            assert_eq!(n.normalize(budget), n.normalize(budget));
        }
    }

    #[test]
    fn deadline_never_exceeds_budget() {
        let n = normalizer();
        for budget in (300..5_000).step_by(37) {
            let deadline = n.normalize(budget).unwrap().as_secs_f64();
            assert!(deadline > 0.0);
            assert!(deadline <= budget as f64 / 1000.0);
        }
    }

    #[test]
    fn rejects_below_minimum() {
        let n = normalizer();
        for budget in [-1, 0, 150, 299] {
            assert_eq!(
                n.normalize(budget),
                Err(BudgetError::BelowMinimum {
                    budget_ms: budget,
                    minimum_ms: 300
                })
            );
        }
    }

    fn with_coefficient(safety_coefficient: f64) -> TimeoutNormalizer {
        TimeoutNormalizer::new(&HedgeConfig {
            safety_coefficient,
            ..HedgeConfig::default()
        })
    }

    #[test]
    fn coefficient_above_one_is_rejected() {
        let err = with_coefficient(1.5).normalize(1000).unwrap_err();
        assert_eq!(
            err,
            BudgetError::DeadlineOutOfRange {
                budget_ms: 1000,
                coefficient: "1.5".to_string()
            }
        );
    }

    #[test]
    fn non_finite_coefficient_is_rejected() {
        for coefficient in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                with_coefficient(coefficient).normalize(1000),
                Err(BudgetError::DeadlineOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn vanishing_coefficient_is_rejected() {
        assert!(matches!(
            with_coefficient(1e-9).normalize(1000),
            Err(BudgetError::DeadlineOutOfRange { .. })
        ));
    }

    #[test]
    fn full_coefficient_keeps_whole_budget() {
        assert_eq!(with_coefficient(1.0).normalize(1234).unwrap().as_secs_f64(), 1.234);
    }

    #[test]
    fn converts_to_duration() {
        let deadline = Duration::from(normalizer().normalize(1000).unwrap());
        let diff = deadline.abs_diff(Duration::from_millis(950));
        assert!(diff < Duration::from_micros(1), "{deadline:?}");
    }
}

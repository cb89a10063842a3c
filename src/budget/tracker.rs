//! Per-session budget tracking.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;

use super::pricing::{PricingTable, global_pricing_table};

/// Micro-USD scale for the atomic cost counter.
const COST_SCALE: u64 = 1_000_000;

/// Budget enforcement mode for one dispatch.
///
/// The engine derives this from the runtime kind: host-integrated
/// execution checks permissively (`WarnAndContinue`), subprocess and CLI
/// execution strictly (`StopBeforeNext`). The tracker itself only counts;
/// the mode arrives with each check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnExceed {
    #[default]
    StopBeforeNext,
    WarnAndContinue,
}

#[derive(Debug)]
pub struct BudgetTracker {
    max_cost_usd: Option<Decimal>,
    used_cost_bits: AtomicU64,
    pricing: &'static PricingTable,
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self {
            max_cost_usd: None,
            used_cost_bits: AtomicU64::new(0),
            pricing: global_pricing_table(),
        }
    }
}

impl BudgetTracker {
    pub fn new(max_cost_usd: Decimal) -> Self {
        Self {
            max_cost_usd: Some(max_cost_usd),
            ..Default::default()
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Record usage reported as token counts; returns the computed cost.
    pub fn record_usage(&self, model: &str, tokens_in: u64, tokens_out: u64) -> Decimal {
        let cost = self.pricing.calculate(model, tokens_in, tokens_out);
        self.record_cost(cost);
        cost
    }

    /// Record a cost the runtime reported directly.
    pub fn record_cost(&self, cost: Decimal) {
        let bits: u64 = (cost * Decimal::from(COST_SCALE)).try_into().unwrap_or(u64::MAX);
        self.used_cost_bits.fetch_add(bits, Ordering::Relaxed);
    }

    fn used_internal(&self) -> Decimal {
        Decimal::from(self.used_cost_bits.load(Ordering::Relaxed)) / Decimal::from(COST_SCALE)
    }

    pub fn used_cost_usd(&self) -> Decimal {
        self.used_internal()
    }

    pub fn remaining(&self) -> Option<Decimal> {
        self.max_cost_usd
            .map(|max| (max - self.used_internal()).max(Decimal::ZERO))
    }

    pub fn limit(&self) -> Option<Decimal> {
        self.max_cost_usd
    }

    pub fn check(&self) -> BudgetStatus {
        let used = self.used_internal();
        match self.max_cost_usd {
            None => BudgetStatus::Unlimited { used },
            Some(max) if used >= max => BudgetStatus::Exceeded {
                used,
                limit: max,
                overage: used - max,
            },
            Some(max) => BudgetStatus::WithinBudget {
                used,
                limit: max,
                remaining: max - used,
            },
        }
    }

    /// Pre-dispatch check: would this projected cost bust the budget?
    ///
    /// In strict mode the call is refused; in permissive mode the overage
    /// is logged and allowed. The refused projection is never recorded.
    pub fn check_projected(
        &self,
        projected: Decimal,
        mode: OnExceed,
        context: &str,
    ) -> crate::Result<()> {
        let Some(limit) = self.max_cost_usd else {
            return Ok(());
        };
        let used = self.used_internal();
        if used + projected <= limit {
            return Ok(());
        }

        match mode {
            OnExceed::WarnAndContinue => {
                tracing::warn!(
                    used = %used,
                    projected = %projected,
                    limit = %limit,
                    context,
                    "budget exceeded; permissive mode proceeds"
                );
                Ok(())
            }
            OnExceed::StopBeforeNext => Err(crate::Error::BudgetExceeded {
                used: decimal_to_f64(used),
                limit: decimal_to_f64(limit),
                context: context.to_string(),
            }),
        }
    }
}

impl Clone for BudgetTracker {
    fn clone(&self) -> Self {
        Self {
            max_cost_usd: self.max_cost_usd,
            used_cost_bits: AtomicU64::new(self.used_cost_bits.load(Ordering::Relaxed)),
            pricing: self.pricing,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BudgetStatus {
    Unlimited {
        used: Decimal,
    },
    WithinBudget {
        used: Decimal,
        limit: Decimal,
        remaining: Decimal,
    },
    Exceeded {
        used: Decimal,
        limit: Decimal,
        overage: Decimal,
    },
}

impl BudgetStatus {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    pub fn used(&self) -> Decimal {
        match self {
            Self::Unlimited { used }
            | Self::WithinBudget { used, .. }
            | Self::Exceeded { used, .. } => *used,
        }
    }
}

pub(crate) fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_usage_accumulates() {
        let tracker = BudgetTracker::new(dec!(10));

        // Sonnet: 0.1M * $3 + 0.05M * $15 = $1.05
        let cost = tracker.record_usage("claude-sonnet-4-5", 100_000, 50_000);
        assert_eq!(cost, dec!(1.05));
        assert_eq!(tracker.used_cost_usd(), dec!(1.05));
        assert!(!tracker.check().is_exceeded());
    }

    #[test]
    fn test_strict_pre_dispatch_check() {
        let tracker = BudgetTracker::new(dec!(1));
        tracker.record_cost(dec!(0.9));

        // 0.9 + 0.05 fits; 0.9 + 0.2 does not.
        assert!(
            tracker
                .check_projected(dec!(0.05), OnExceed::StopBeforeNext, "call")
                .is_ok()
        );
        let err = tracker
            .check_projected(dec!(0.2), OnExceed::StopBeforeNext, "call")
            .unwrap_err();
        assert_eq!(err.code(), "budget_exceeded");

        // The refused projection was never recorded.
        assert_eq!(tracker.used_cost_usd(), dec!(0.9));
    }

    #[test]
    fn test_permissive_mode_allows_overage() {
        let tracker = BudgetTracker::new(dec!(1));
        tracker.record_cost(dec!(5));

        assert!(tracker.check().is_exceeded());
        assert!(
            tracker
                .check_projected(dec!(1), OnExceed::WarnAndContinue, "call")
                .is_ok()
        );
    }

    #[test]
    fn test_unlimited_never_stops() {
        let tracker = BudgetTracker::unlimited();
        tracker.record_cost(dec!(10_000));
        assert!(
            tracker
                .check_projected(dec!(1_000), OnExceed::StopBeforeNext, "call")
                .is_ok()
        );
        assert!(matches!(tracker.check(), BudgetStatus::Unlimited { .. }));
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(BudgetTracker::new(dec!(100_000)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        t.record_cost(dec!(0.001));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tracker.used_cost_usd(), dec!(8));
    }
}

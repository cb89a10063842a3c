//! Budget enforcement: pricing, per-session trackers, and the book that
//! holds them.
//!
//! Trackers count cumulative cost per session; the enforcement mode
//! arrives with each pre-dispatch check, derived from the runtime kind:
//! host-integrated execution checks permissively (log and proceed on
//! overage), subprocess and CLI execution strictly. The strict check is
//! predictive - a call whose worst-case cost would bust the limit is
//! never dispatched.

mod pricing;
mod tracker;

pub use pricing::{ModelPricing, PricingTable, PricingTableBuilder, global_pricing_table};
pub use tracker::{BudgetStatus, BudgetTracker, OnExceed};

pub(crate) use tracker::decimal_to_f64;

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;

/// Per-session budget trackers, keyed by session id.
#[derive(Debug, Clone, Default)]
pub struct BudgetBook {
    trackers: Arc<DashMap<String, Arc<BudgetTracker>>>,
    default_budget_usd: Option<Decimal>,
}

impl BudgetBook {
    pub fn new(default_budget_usd: Option<f64>) -> Self {
        Self {
            trackers: Arc::new(DashMap::new()),
            default_budget_usd: default_budget_usd.and_then(Decimal::from_f64),
        }
    }

    /// Tracker for a session, created on first use with the default budget.
    pub fn tracker(&self, session: &str) -> Arc<BudgetTracker> {
        self.trackers
            .entry(session.to_string())
            .or_insert_with(|| {
                Arc::new(match self.default_budget_usd {
                    Some(limit) => BudgetTracker::new(limit),
                    None => BudgetTracker::unlimited(),
                })
            })
            .clone()
    }

    /// Install an explicit budget for a session, replacing any tracker.
    pub fn set_budget(&self, session: &str, max_cost_usd: f64) {
        let tracker = match Decimal::from_f64(max_cost_usd) {
            Some(limit) => BudgetTracker::new(limit),
            None => BudgetTracker::unlimited(),
        };
        self.trackers
            .insert(session.to_string(), Arc::new(tracker));
    }

    pub fn remove(&self, session: &str) -> Option<Arc<BudgetTracker>> {
        self.trackers.remove(session).map(|(_, t)| t)
    }

    pub fn summary(&self) -> Vec<SessionBudgetSummary> {
        let mut rows: Vec<SessionBudgetSummary> = self
            .trackers
            .iter()
            .map(|entry| {
                let tracker = entry.value();
                SessionBudgetSummary {
                    session: entry.key().clone(),
                    used_usd: decimal_to_f64(tracker.used_cost_usd()),
                    limit_usd: tracker.limit().map(decimal_to_f64),
                    exceeded: tracker.check().is_exceeded(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.session.cmp(&b.session));
        rows
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionBudgetSummary {
    pub session: String,
    pub used_usd: f64,
    pub limit_usd: Option<f64>,
    pub exceeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tracker_created_with_default_budget() {
        let book = BudgetBook::new(Some(5.0));
        let tracker = book.tracker("s1");
        assert_eq!(tracker.limit(), Some(dec!(5)));

        // Same session gets the same tracker.
        tracker.record_cost(dec!(1));
        assert_eq!(book.tracker("s1").used_cost_usd(), dec!(1));
    }

    #[test]
    fn test_sessions_are_independent() {
        let book = BudgetBook::new(None);
        book.tracker("a").record_cost(dec!(3));
        assert_eq!(book.tracker("b").used_cost_usd(), dec!(0));
    }

    #[test]
    fn test_set_budget_replaces() {
        let book = BudgetBook::new(None);
        book.tracker("s1").record_cost(dec!(9));

        book.set_budget("s1", 2.0);
        assert_eq!(book.tracker("s1").used_cost_usd(), dec!(0));
        assert_eq!(book.tracker("s1").limit(), Some(dec!(2)));
    }

    #[test]
    fn test_summary_sorted() {
        let book = BudgetBook::new(Some(1.0));
        book.tracker("zeta");
        book.tracker("alpha");

        let summary = book.summary();
        assert_eq!(summary[0].session, "alpha");
        assert_eq!(summary[1].session, "zeta");
    }
}

// libs/treatment-plan-cell/src/services/totals.rs
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{ItemStatus, PlanItem};

/// Monetary totals and execution progress derived from a plan's items.
/// Cancelled items never contribute; the total never goes negative.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTotals {
    pub subtotal: Decimal,
    pub total: Decimal,
    pub overall_progress: f32,
}

pub struct PlanTotalsService;

impl PlanTotalsService {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, items: &[PlanItem], discount: Decimal) -> PlanTotals {
        let billable: Vec<&PlanItem> = items
            .iter()
            .filter(|item| item.status != ItemStatus::Cancelled)
            .collect();

        let subtotal: Decimal = billable.iter().map(|item| item.final_cost).sum();

        let total = {
            let discounted = subtotal - discount;
            if discounted < Decimal::ZERO {
                Decimal::ZERO
            } else {
                discounted
            }
        };

        let overall_progress = if billable.is_empty() {
            0.0
        } else {
            let sum: i64 = billable
                .iter()
                .map(|item| i64::from(item.progress_percent))
                .sum();
            sum as f32 / billable.len() as f32
        };

        debug!(
            "Computed plan totals: subtotal {}, total {}, progress {:.1}%",
            subtotal, total, overall_progress
        );

        PlanTotals {
            subtotal,
            total,
            overall_progress,
        }
    }

    /// All work recorded: every non-cancelled item completed, and there is
    /// at least one. Drives plan auto-completion.
    pub fn all_items_executed(&self, items: &[PlanItem]) -> bool {
        let billable: Vec<&PlanItem> = items
            .iter()
            .filter(|item| item.status != ItemStatus::Cancelled)
            .collect();

        !billable.is_empty()
            && billable
                .iter()
                .all(|item| item.status == ItemStatus::Completed && item.executed_at.is_some())
    }
}

impl Default for PlanTotalsService {
    fn default() -> Self {
        Self::new()
    }
}

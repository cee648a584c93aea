// libs/treatment-plan-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{AcceptanceStatus, ItemStatus, PlanError, TreatmentStatus};

pub struct PlanLifecycleService;

impl PlanLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate an execution-axis transition
    pub fn validate_treatment_transition(
        &self,
        current_status: &TreatmentStatus,
        new_status: &TreatmentStatus,
    ) -> Result<(), PlanError> {
        debug!(
            "Validating treatment transition from {} to {}",
            current_status, new_status
        );

        let valid_transitions = self.get_valid_treatment_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid treatment transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(PlanError::InvalidTreatmentTransition(*current_status));
        }

        Ok(())
    }

    /// Get all valid next execution statuses for a given current status
    pub fn get_valid_treatment_transitions(
        &self,
        current_status: &TreatmentStatus,
    ) -> Vec<TreatmentStatus> {
        match current_status {
            TreatmentStatus::Proposed => vec![
                TreatmentStatus::Accepted,
                TreatmentStatus::Cancelled,
            ],
            TreatmentStatus::Accepted => vec![
                TreatmentStatus::InProgress,
                TreatmentStatus::Cancelled,
            ],
            TreatmentStatus::InProgress => vec![
                TreatmentStatus::Completed,
                TreatmentStatus::Paused,
                TreatmentStatus::Cancelled,
            ],
            TreatmentStatus::Paused => vec![
                TreatmentStatus::InProgress,
                TreatmentStatus::Cancelled,
            ],
            // Terminal states
            TreatmentStatus::Completed => vec![],
            TreatmentStatus::Cancelled => vec![],
        }
    }

    /// Validate an item transition. Completion requires a prior Active state.
    pub fn validate_item_transition(
        &self,
        current_status: &ItemStatus,
        new_status: &ItemStatus,
    ) -> Result<(), PlanError> {
        let valid_transitions = self.get_valid_item_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid item transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(PlanError::InvalidItemTransition(*current_status));
        }

        Ok(())
    }

    pub fn get_valid_item_transitions(&self, current_status: &ItemStatus) -> Vec<ItemStatus> {
        match current_status {
            ItemStatus::Pending => vec![ItemStatus::Active, ItemStatus::Cancelled],
            ItemStatus::Active => vec![ItemStatus::Completed, ItemStatus::Cancelled],
            // Terminal states
            ItemStatus::Completed => vec![],
            ItemStatus::Cancelled => vec![],
        }
    }

    /// The patient can only answer while the quote is in vigency.
    pub fn validate_acceptance_window(
        &self,
        valid_until: Option<DateTime<Utc>>,
        current_time: DateTime<Utc>,
    ) -> Result<(), PlanError> {
        if let Some(deadline) = valid_until {
            if current_time > deadline {
                return Err(PlanError::AcceptanceWindowClosed(deadline));
            }
        }
        Ok(())
    }

    /// A rejected plan can still be accepted while the window is open;
    /// Expired is the only closed acceptance state.
    pub fn can_record_acceptance(&self, acceptance_status: &AcceptanceStatus) -> bool {
        !matches!(acceptance_status, AcceptanceStatus::Expired)
    }
}

impl Default for PlanLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InConsultation,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InConsultation => vec![
                AppointmentStatus::Diagnosed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Diagnosed => vec![
                AppointmentStatus::Planned,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Planned => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }

    /// Check if an appointment should be offered for no-show marking
    pub fn should_mark_no_show(
        &self,
        current_status: &AppointmentStatus,
        confirmed_for: Option<DateTime<Utc>>,
        current_time: DateTime<Utc>,
    ) -> bool {
        if *current_status != AppointmentStatus::Confirmed {
            return false;
        }

        let Some(confirmed_for) = confirmed_for else {
            return false;
        };

        // Grace period past the confirmed time
        let no_show_threshold = confirmed_for + Duration::minutes(30);
        current_time > no_show_threshold
    }

    /// Validate booking timing constraints
    pub fn validate_requested_timing(
        &self,
        requested_for: DateTime<Utc>,
        current_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if requested_for <= current_time {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be requested for a future time".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn transition_table_matches_the_lifecycle_graph() {
        let service = AppointmentLifecycleService::new();

        let allowed: Vec<(AppointmentStatus, AppointmentStatus)> = vec![
            (AppointmentStatus::Pending, AppointmentStatus::Confirmed),
            (AppointmentStatus::Pending, AppointmentStatus::Cancelled),
            (AppointmentStatus::Confirmed, AppointmentStatus::InConsultation),
            (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled),
            (AppointmentStatus::Confirmed, AppointmentStatus::NoShow),
            (AppointmentStatus::InConsultation, AppointmentStatus::Diagnosed),
            (AppointmentStatus::InConsultation, AppointmentStatus::Cancelled),
            (AppointmentStatus::Diagnosed, AppointmentStatus::Planned),
            (AppointmentStatus::Diagnosed, AppointmentStatus::Completed),
            (AppointmentStatus::Diagnosed, AppointmentStatus::Cancelled),
            (AppointmentStatus::Planned, AppointmentStatus::Completed),
            (AppointmentStatus::Planned, AppointmentStatus::Cancelled),
        ];

        let all = [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InConsultation,
            AppointmentStatus::Diagnosed,
            AppointmentStatus::Planned,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ];

        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                let actual = service.validate_status_transition(&from, &to).is_ok();
                assert_eq!(
                    actual, expected,
                    "transition {} -> {} should be {}",
                    from,
                    to,
                    if expected { "allowed" } else { "rejected" }
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let service = AppointmentLifecycleService::new();
        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(service.get_valid_transitions(&terminal).is_empty());
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn rejected_transition_names_the_current_status() {
        let service = AppointmentLifecycleService::new();
        assert_matches!(
            service.validate_status_transition(
                &AppointmentStatus::Completed,
                &AppointmentStatus::Confirmed
            ),
            Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed))
        );
    }

    #[test]
    fn no_show_requires_confirmation_and_grace_period() {
        let service = AppointmentLifecycleService::new();
        let confirmed_for = Utc::now();

        assert!(!service.should_mark_no_show(
            &AppointmentStatus::Pending,
            Some(confirmed_for),
            confirmed_for + Duration::hours(2),
        ));

        assert!(!service.should_mark_no_show(
            &AppointmentStatus::Confirmed,
            Some(confirmed_for),
            confirmed_for + Duration::minutes(10),
        ));

        assert!(service.should_mark_no_show(
            &AppointmentStatus::Confirmed,
            Some(confirmed_for),
            confirmed_for + Duration::minutes(31),
        ));

        // Never confirmed for a concrete time
        assert!(!service.should_mark_no_show(
            &AppointmentStatus::Confirmed,
            None,
            confirmed_for + Duration::hours(2),
        ));
    }

    #[test]
    fn booking_in_the_past_is_rejected() {
        let service = AppointmentLifecycleService::new();
        let now = Utc::now();
        assert!(service
            .validate_requested_timing(now - Duration::minutes(1), now)
            .is_err());
        assert!(service
            .validate_requested_timing(now + Duration::hours(1), now)
            .is_ok());
    }
}

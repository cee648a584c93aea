// libs/appointment-cell/src/services/scheduling.rs
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use billing_cell::services::balance::BalanceService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    ConfirmAppointmentRequest, CreateAppointmentRequest, RecordDiagnosisRequest,
    StartConsultationRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Storage-backed appointment workflow. Every mutation re-validates the
/// transition table before writing; audit and notification rows are
/// best-effort side effects that never roll a transition back.
pub struct AppointmentSchedulingService {
    supabase: Arc<SupabaseClient>,
    lifecycle: AppointmentLifecycleService,
    balances: BalanceService,
}

impl AppointmentSchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle: AppointmentLifecycleService::new(),
            balances: BalanceService::new(config),
        }
    }

    pub async fn get_appointment(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let filters = format!("id=eq.{}&{}", appointment_id, tenant.filter());
        self.supabase
            .select_one("appointments", &filters, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn create_appointment(
        &self,
        tenant: &TenantContext,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle
            .validate_requested_timing(request.requested_for, Utc::now())?;

        if request.consultation_fee < Decimal::ZERO {
            return Err(AppointmentError::ValidationError(
                "Consultation fee cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let appointment: Appointment = self
            .supabase
            .insert(
                "appointments",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "patient_id": request.patient_id,
                    "dentist_id": request.dentist_id,
                    "receptionist_id": request.receptionist_id,
                    "slot_id": request.slot_id,
                    "status": AppointmentStatus::Pending,
                    "requested_for": request.requested_for,
                    "reason": request.reason,
                    "requires_payment": request.requires_payment,
                    "consultation_fee": request.consultation_fee,
                    "created_at": now,
                    "updated_at": now,
                }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!(
            "Appointment {} created for patient {} with dentist {}",
            appointment.id, appointment.patient_id, appointment.dentist_id
        );
        Ok(appointment)
    }

    pub async fn confirm_appointment(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        request: ConfirmAppointmentRequest,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::Confirmed,
            json!({ "confirmed_for": request.confirmed_for }),
            actor,
            auth_token,
        )
        .await
    }

    /// Records the patient's arrival at the front desk. Not a lifecycle
    /// transition: the appointment stays Confirmed and the first recorded
    /// arrival wins.
    pub async fn mark_arrived(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        if appointment.status != AppointmentStatus::Confirmed {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        if appointment.arrived_at.is_some() {
            return Ok(appointment);
        }

        let filters = format!("id=eq.{}&{}", appointment_id, tenant.filter());
        let updated: Appointment = self
            .supabase
            .update(
                "appointments",
                &filters,
                json!({ "arrived_at": Utc::now(), "updated_at": Utc::now() }),
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!("Appointment {} patient arrival recorded", appointment_id);
        Ok(updated)
    }

    pub async fn start_consultation(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        request: StartConsultationRequest,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        // A consultation never starts without a recorded motive
        let reason = request
            .reason
            .or_else(|| appointment.reason.clone())
            .filter(|r| !r.trim().is_empty())
            .ok_or(AppointmentError::MissingMotive)?;

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::InConsultation,
            json!({ "reason": reason, "started_at": Utc::now() }),
            actor,
            auth_token,
        )
        .await
    }

    pub async fn record_diagnosis(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        request: RecordDiagnosisRequest,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.diagnosis.trim().is_empty() {
            return Err(AppointmentError::MissingDiagnosis);
        }

        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::Diagnosed,
            json!({
                "diagnosis": request.diagnosis,
                "treatment_notes": request.treatment_notes,
            }),
            actor,
            auth_token,
        )
        .await
    }

    pub async fn attach_plan(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        plan_id: Uuid,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::Planned,
            json!({ "plan_id": plan_id }),
            actor,
            auth_token,
        )
        .await
    }

    /// Close out the visit. When the appointment requires payment, the
    /// prepay/copay balance has to be settled first.
    pub async fn complete_appointment(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &AppointmentStatus::Completed)?;

        if appointment.requires_payment {
            let balance = self
                .balances
                .appointment_balance(tenant, appointment_id, auth_token)
                .await
                .map_err(|e| AppointmentError::Billing(e.to_string()))?;

            if balance.balance > Decimal::ZERO {
                warn!(
                    "Completion of appointment {} blocked by outstanding balance {}",
                    appointment_id, balance.balance
                );
                return Err(AppointmentError::OutstandingBalance(balance.balance));
            }
        }

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::Completed,
            json!({ "ended_at": Utc::now() }),
            actor,
            auth_token,
        )
        .await
    }

    pub async fn cancel_appointment(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "A cancellation reason is required".to_string(),
            ));
        }

        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::Cancelled,
            json!({ "cancellation_reason": request.reason }),
            actor,
            auth_token,
        )
        .await
    }

    pub async fn mark_no_show(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(tenant, appointment_id, auth_token).await?;

        // No-show only once the grace period past the confirmed time ran out;
        // a patient who called off beforehand is a cancellation instead
        if !self.lifecycle.should_mark_no_show(
            &appointment.status,
            appointment.confirmed_for,
            Utc::now(),
        ) {
            self.lifecycle
                .validate_status_transition(&appointment.status, &AppointmentStatus::NoShow)?;
            return Err(AppointmentError::ValidationError(
                "The no-show grace period has not elapsed".to_string(),
            ));
        }

        self.apply_transition(
            tenant,
            &appointment,
            AppointmentStatus::NoShow,
            json!({}),
            actor,
            auth_token,
        )
        .await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Re-validate the transition, write the new state, then fire the
    /// best-effort side effects.
    async fn apply_transition(
        &self,
        tenant: &TenantContext,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        mut patch: Value,
        actor: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle
            .validate_status_transition(&appointment.status, &new_status)?;

        patch["status"] = json!(new_status);
        patch["updated_at"] = json!(Utc::now());

        let filters = format!("id=eq.{}&{}", appointment.id, tenant.filter());
        let updated: Appointment = self
            .supabase
            .update("appointments", &filters, patch, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!(
            "Appointment {} moved {} -> {}",
            appointment.id, appointment.status, new_status
        );

        self.record_audit(tenant, appointment, new_status, actor, auth_token)
            .await;
        self.enqueue_notification(tenant, &updated, auth_token).await;

        Ok(updated)
    }

    async fn record_audit(
        &self,
        tenant: &TenantContext,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        actor: &str,
        auth_token: &str,
    ) {
        let result = self
            .supabase
            .insert_only(
                "audit_events",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "appointment_id": appointment.id,
                    "from_status": appointment.status,
                    "to_status": new_status,
                    "actor": actor,
                    "recorded_at": Utc::now(),
                }),
                auth_token,
            )
            .await;

        if let Err(e) = result {
            warn!(
                "Audit trail write failed for appointment {}: {}",
                appointment.id, e
            );
        }
    }

    async fn enqueue_notification(
        &self,
        tenant: &TenantContext,
        appointment: &Appointment,
        auth_token: &str,
    ) {
        let result = self
            .supabase
            .insert_only(
                "notification_outbox",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "appointment_id": appointment.id,
                    "patient_id": appointment.patient_id,
                    "status": appointment.status,
                    "queued_at": Utc::now(),
                }),
                auth_token,
            )
            .await;

        if let Err(e) = result {
            warn!(
                "Notification enqueue failed for appointment {}: {}",
                appointment.id, e
            );
        }
    }
}

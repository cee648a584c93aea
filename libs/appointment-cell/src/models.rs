// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub receptionist_id: Option<Uuid>,
    pub slot_id: Option<Uuid>,
    pub status: AppointmentStatus,
    /// Date and time the patient asked for.
    pub requested_for: DateTime<Utc>,
    /// Date and time the front desk confirmed, set on confirmation.
    pub confirmed_for: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Treatment plan produced by this visit, set on attach.
    pub plan_id: Option<Uuid>,
    pub requires_payment: bool,
    pub consultation_fee: Decimal,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire values are the legacy Spanish status strings stored in the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppointmentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "confirmada")]
    Confirmed,
    #[serde(rename = "en_consulta")]
    InConsultation,
    #[serde(rename = "diagnosticada")]
    Diagnosed,
    #[serde(rename = "con_plan")]
    Planned,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
    #[serde(rename = "no_asistio")]
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pendiente"),
            AppointmentStatus::Confirmed => write!(f, "confirmada"),
            AppointmentStatus::InConsultation => write!(f, "en_consulta"),
            AppointmentStatus::Diagnosed => write!(f, "diagnosticada"),
            AppointmentStatus::Planned => write!(f, "con_plan"),
            AppointmentStatus::Completed => write!(f, "completada"),
            AppointmentStatus::Cancelled => write!(f, "cancelada"),
            AppointmentStatus::NoShow => write!(f, "no_asistio"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub receptionist_id: Option<Uuid>,
    pub slot_id: Option<Uuid>,
    pub requested_for: DateTime<Utc>,
    pub reason: Option<String>,
    pub requires_payment: bool,
    pub consultation_fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAppointmentRequest {
    pub confirmed_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConsultationRequest {
    /// Motive recorded at the chair when the booking carried none.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDiagnosisRequest {
    pub diagnosis: String,
    pub treatment_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPlanRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Clinic,
    System,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("A consultation cannot start without a recorded motive")]
    MissingMotive,

    #[error("A diagnosis text is required")]
    MissingDiagnosis,

    #[error("Appointment has an outstanding balance of {0}")]
    OutstandingBalance(Decimal),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Billing lookup failed: {0}")]
    Billing(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

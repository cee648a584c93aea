// libs/treatment-plan-cell/src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE PLAN MODELS
// ==============================================================================

/// A treatment plan groups the billable procedures quoted after a diagnosis.
/// Three independent status axes:
/// - `approval_status` gates editability (a signed-off quote stops changing),
/// - `acceptance_status` tracks the patient's answer within a vigency window,
/// - `treatment_status` tracks clinical execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    /// Appointment the plan came out of, when created chairside.
    pub appointment_id: Option<Uuid>,
    pub approval_status: ApprovalStatus,
    pub treatment_status: TreatmentStatus,
    pub acceptance_status: AcceptanceStatus,
    /// Patient may accept until this instant; afterwards the quote lapses.
    pub valid_until: Option<DateTime<Utc>>,
    pub is_editable: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub discount: Decimal,
    /// Sum over non-cancelled items; stored on every recompute.
    pub subtotal: Decimal,
    /// `max(subtotal − discount, 0)`.
    pub total: Decimal,
    /// Mean progress of non-cancelled items, 0–100.
    pub overall_progress: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire values are the legacy Spanish strings stored in the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApprovalStatus {
    #[serde(rename = "Borrador")]
    Draft,
    #[serde(rename = "Aprobado")]
    Approved,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Draft => write!(f, "Borrador"),
            ApprovalStatus::Approved => write!(f, "Aprobado"),
            ApprovalStatus::Cancelled => write!(f, "Cancelado"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TreatmentStatus {
    #[serde(rename = "Propuesto")]
    Proposed,
    #[serde(rename = "Aceptado")]
    Accepted,
    #[serde(rename = "En Ejecución")]
    InProgress,
    #[serde(rename = "Completado")]
    Completed,
    #[serde(rename = "Pausado")]
    Paused,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl TreatmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TreatmentStatus::Completed | TreatmentStatus::Cancelled)
    }
}

impl fmt::Display for TreatmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreatmentStatus::Proposed => write!(f, "Propuesto"),
            TreatmentStatus::Accepted => write!(f, "Aceptado"),
            TreatmentStatus::InProgress => write!(f, "En Ejecución"),
            TreatmentStatus::Completed => write!(f, "Completado"),
            TreatmentStatus::Paused => write!(f, "Pausado"),
            TreatmentStatus::Cancelled => write!(f, "Cancelado"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AcceptanceStatus {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Aceptado")]
    Accepted,
    #[serde(rename = "Rechazado")]
    Rejected,
    #[serde(rename = "Caducado")]
    Expired,
    #[serde(rename = "Parcial")]
    Partial,
}

impl fmt::Display for AcceptanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceStatus::Pending => write!(f, "Pendiente"),
            AcceptanceStatus::Accepted => write!(f, "Aceptado"),
            AcceptanceStatus::Rejected => write!(f, "Rechazado"),
            AcceptanceStatus::Expired => write!(f, "Caducado"),
            AcceptanceStatus::Partial => write!(f, "Parcial"),
        }
    }
}

// ==============================================================================
// PLAN ITEM MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub procedure_code: String,
    pub description: Option<String>,
    pub status: ItemStatus,
    pub final_cost: Decimal,
    pub order_index: i32,
    pub executed_by: Option<Uuid>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Highest session progress seen so far, 0–100.
    pub progress_percent: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Activo")]
    Active,
    #[serde(rename = "Cancelado")]
    Cancelled,
    #[serde(rename = "Completado")]
    Completed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Cancelled | ItemStatus::Completed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "Pendiente"),
            ItemStatus::Active => write!(f, "Activo"),
            ItemStatus::Cancelled => write!(f, "Cancelado"),
            ItemStatus::Completed => write!(f, "Completado"),
        }
    }
}

// ==============================================================================
// SESSION MODELS
// ==============================================================================

/// One row per (item, visit). Progress only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentSession {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub progress_percent: i32,
    pub notes: Option<String>,
    pub performed_by: Uuid,
    pub performed_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub valid_until: Option<DateTime<Utc>>,
    pub discount: Option<Decimal>,
    pub items: Vec<NewItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItemRequest {
    pub procedure_code: String,
    pub description: Option<String>,
    pub final_cost: Decimal,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptPlanRequest {
    /// Accept only these items; `None` accepts every pending item.
    pub item_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSessionRequest {
    pub appointment_id: Option<Uuid>,
    pub progress_percent: i32,
    pub notes: Option<String>,
}

// ==============================================================================
// READ MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub plan: TreatmentPlan,
    pub items: Vec<PlanItem>,
    pub item_balances: Vec<billing_cell::models::ItemBalance>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("Treatment plan not found")]
    NotFound,

    #[error("Plan item not found")]
    ItemNotFound,

    #[error("Plan is no longer editable")]
    PlanNotEditable,

    #[error("Plan approval cannot change from {0}")]
    InvalidApprovalTransition(ApprovalStatus),

    #[error("Treatment cannot change status from {0}")]
    InvalidTreatmentTransition(TreatmentStatus),

    #[error("Item cannot change status from {0}")]
    InvalidItemTransition(ItemStatus),

    #[error("Only an approved plan can be accepted")]
    NotApproved,

    #[error("The acceptance window closed on {0}")]
    AcceptanceWindowClosed(DateTime<Utc>),

    #[error("Execution requires at least one active item")]
    NoActiveItems,

    #[error("Session progress {attempted}% is below the recorded {current}%")]
    ProgressRegression { current: i32, attempted: i32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Billing lookup failed: {0}")]
    Billing(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

// libs/billing-cell/src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// LEDGER MODELS
// ==============================================================================

/// One row of the append-only payment ledger. A payment belongs to exactly
/// one scope: a treatment plan or a single appointment. Rows are never
/// deleted or re-priced; corrections are new rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn scope(&self) -> PaymentScope {
        match (self.plan_id, self.appointment_id) {
            (Some(plan_id), _) => PaymentScope::Plan(plan_id),
            (None, Some(appointment_id)) => PaymentScope::Appointment(appointment_id),
            (None, None) => PaymentScope::Unscoped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentScope {
    Plan(Uuid),
    Appointment(Uuid),
    /// Only possible for corrupted rows; rejected everywhere.
    Unscoped,
}

/// Wire values are the legacy Spanish status strings stored in the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "procesando")]
    Processing,
    #[serde(rename = "aprobado")]
    Approved,
    #[serde(rename = "rechazado")]
    Rejected,
    #[serde(rename = "cancelado")]
    Cancelled,
    #[serde(rename = "reembolsado")]
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Rejected | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pendiente"),
            PaymentStatus::Processing => write!(f, "procesando"),
            PaymentStatus::Approved => write!(f, "aprobado"),
            PaymentStatus::Rejected => write!(f, "rechazado"),
            PaymentStatus::Cancelled => write!(f, "cancelado"),
            PaymentStatus::Refunded => write!(f, "reembolsado"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    #[serde(rename = "efectivo")]
    Cash,
    #[serde(rename = "tarjeta")]
    Card,
    #[serde(rename = "transferencia")]
    Transfer,
    #[serde(rename = "en_linea")]
    Online,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "efectivo"),
            PaymentMethod::Card => write!(f, "tarjeta"),
            PaymentMethod::Transfer => write!(f, "transferencia"),
            PaymentMethod::Online => write!(f, "en_linea"),
        }
    }
}

/// Split of a plan-scoped payment across plan items. The sum of a payment's
/// allocations never exceeds the payment amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentItemAllocation {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub item_id: Uuid,
    pub amount: Decimal,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub plan_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Optional item split; only valid for plan-scoped payments.
    pub allocations: Option<Vec<AllocationRequest>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub item_id: Uuid,
    pub amount: Decimal,
}

// ==============================================================================
// BALANCE MODELS
// ==============================================================================

/// `balance = cost − Σ(approved payments in scope)`, floored at zero.
/// Recomputed from the ledger on every call; nothing is cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentBalance {
    pub appointment_id: Uuid,
    pub consultation_fee: Decimal,
    pub approved_total: Decimal,
    pub refunded_total: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanBalance {
    pub plan_id: Uuid,
    pub total: Decimal,
    pub approved_total: Decimal,
    pub refunded_total: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBalance {
    pub item_id: Uuid,
    pub final_cost: Decimal,
    pub allocated_approved: Decimal,
    pub balance: Decimal,
    pub paid: bool,
}

// ==============================================================================
// ROW VIEWS OF SIBLING-CELL TABLES
// ==============================================================================

// The calculators read only the charge columns they aggregate over.

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentChargeRow {
    pub id: Uuid,
    pub requires_payment: bool,
    pub consultation_fee: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanChargeRow {
    pub id: Uuid,
    pub total: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemChargeRow {
    pub id: Uuid,
    pub final_cost: Decimal,
    pub status: String,
}

/// Allocation with its parent payment's status embedded, as returned by
/// `payment_item_allocations?select=item_id,amount,payment:payments(status)`.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationWithPayment {
    pub item_id: Uuid,
    pub amount: Decimal,
    pub payment: AllocationPaymentView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationPaymentView {
    pub status: PaymentStatus,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BillingError {
    #[error("Payment not found")]
    NotFound,

    #[error("Charge target not found")]
    ChargeTargetNotFound,

    #[error("Payment cannot change status from {0}")]
    InvalidStatusTransition(PaymentStatus),

    #[error("Payment must reference exactly one of plan or appointment")]
    InvalidScope,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Allocations exceed the payment amount")]
    AllocationExceedsPayment,

    #[error("Item allocations are only valid for plan-scoped payments")]
    AllocationWithoutPlan,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

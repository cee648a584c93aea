// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::tenant::TenantContext;

use crate::models::{BillingError, CreatePaymentRequest, PaymentStatus};
use crate::services::balance::BalanceService;
use crate::services::ledger::PaymentLedgerService;

fn map_billing_error(e: BillingError) -> AppError {
    match e {
        BillingError::NotFound => AppError::NotFound("Payment not found".to_string()),
        BillingError::ChargeTargetNotFound => {
            AppError::NotFound("Charge target not found".to_string())
        }
        BillingError::InvalidStatusTransition(status) => {
            AppError::Conflict(format!("Payment cannot change status from {}", status))
        }
        BillingError::InvalidScope => AppError::BadRequest(
            "Payment must reference exactly one of plan or appointment".to_string(),
        ),
        BillingError::InvalidAmount(msg) => AppError::BadRequest(msg),
        BillingError::AllocationExceedsPayment => {
            AppError::BadRequest("Allocations exceed the payment amount".to_string())
        }
        BillingError::AllocationWithoutPlan => AppError::BadRequest(
            "Item allocations are only valid for plan-scoped payments".to_string(),
        ),
        BillingError::ValidationError(msg) => AppError::BadRequest(msg),
        BillingError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

fn ensure_front_desk(user: &User) -> Result<(), AppError> {
    if user.can_manage_front_desk() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only admins and receptionists can manage payments".to_string(),
        ))
    }
}

#[axum::debug_handler]
pub async fn create_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_front_desk(&user)?;

    let ledger = PaymentLedgerService::new(&state);
    let payment = ledger
        .create_payment(&tenant, request, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
    })))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let ledger = PaymentLedgerService::new(&state);
    let payment = ledger
        .get_payment(&tenant, payment_id, auth.token())
        .await
        .map_err(map_billing_error)?;
    let allocations = ledger
        .get_allocations(payment_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({
        "payment": payment,
        "allocations": allocations,
    })))
}

async fn transition(
    state: Arc<AppConfig>,
    tenant: TenantContext,
    user: User,
    payment_id: Uuid,
    new_status: PaymentStatus,
    token: &str,
) -> Result<Json<Value>, AppError> {
    ensure_front_desk(&user)?;

    let ledger = PaymentLedgerService::new(&state);
    let payment = ledger
        .transition_payment(&tenant, payment_id, new_status, token)
        .await
        .map_err(map_billing_error)?;

    // Approving (or refunding) changes what the scope still owes; re-derive
    // and report it in the same response.
    let balance = if matches!(new_status, PaymentStatus::Approved | PaymentStatus::Refunded) {
        let balances = BalanceService::new(&state);
        Some(
            balances
                .balance_for_payment(&tenant, &payment, token)
                .await
                .map_err(map_billing_error)?,
        )
    } else {
        None
    };

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "balance": balance,
    })))
}

#[axum::debug_handler]
pub async fn process_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    transition(state, tenant, user, payment_id, PaymentStatus::Processing, auth.token()).await
}

#[axum::debug_handler]
pub async fn approve_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    transition(state, tenant, user, payment_id, PaymentStatus::Approved, auth.token()).await
}

#[axum::debug_handler]
pub async fn reject_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    transition(state, tenant, user, payment_id, PaymentStatus::Rejected, auth.token()).await
}

#[axum::debug_handler]
pub async fn cancel_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    transition(state, tenant, user, payment_id, PaymentStatus::Cancelled, auth.token()).await
}

#[axum::debug_handler]
pub async fn refund_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    transition(state, tenant, user, payment_id, PaymentStatus::Refunded, auth.token()).await
}

// Balance reads are open to every authenticated role; row-level security
// scopes patients to their own records.

#[axum::debug_handler]
pub async fn get_plan_balance(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let balances = BalanceService::new(&state);
    let balance = balances
        .plan_balance(&tenant, plan_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "balance": balance })))
}

#[axum::debug_handler]
pub async fn get_appointment_balance(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let balances = BalanceService::new(&state);
    let balance = balances
        .appointment_balance(&tenant, appointment_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "balance": balance })))
}

#[axum::debug_handler]
pub async fn get_item_balance(
    State(state): State<Arc<AppConfig>>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let balances = BalanceService::new(&state);
    let balance = balances
        .item_balance(&tenant, item_id, auth.token())
        .await
        .map_err(map_billing_error)?;

    Ok(Json(json!({ "balance": balance })))
}

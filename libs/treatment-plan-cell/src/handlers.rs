// libs/treatment-plan-cell/src/handlers.rs
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

use crate::models::{
    AcceptPlanRequest, CreatePlanRequest, NewItemRequest, PlanError, RecordSessionRequest,
};
use crate::services::planning::TreatmentPlanningService;
use crate::services::progress::TreatmentProgressService;

fn map_plan_error(e: PlanError) -> AppError {
    match e {
        PlanError::NotFound => AppError::NotFound("Treatment plan not found".to_string()),
        PlanError::ItemNotFound => AppError::NotFound("Plan item not found".to_string()),
        PlanError::PlanNotEditable => {
            AppError::Conflict("Plan is no longer editable".to_string())
        }
        PlanError::InvalidApprovalTransition(status) => {
            AppError::Conflict(format!("Plan approval cannot change from {}", status))
        }
        PlanError::InvalidTreatmentTransition(status) => {
            AppError::Conflict(format!("Treatment cannot change status from {}", status))
        }
        PlanError::InvalidItemTransition(status) => {
            AppError::Conflict(format!("Item cannot change status from {}", status))
        }
        PlanError::NotApproved => {
            AppError::Conflict("Only an approved plan can be accepted".to_string())
        }
        PlanError::AcceptanceWindowClosed(deadline) => {
            AppError::Conflict(format!("The acceptance window closed on {}", deadline))
        }
        PlanError::NoActiveItems => {
            AppError::Conflict("Execution requires at least one active item".to_string())
        }
        PlanError::ProgressRegression { current, attempted } => AppError::BadRequest(format!(
            "Session progress {}% is below the recorded {}%",
            attempted, current
        )),
        PlanError::ValidationError(msg) => AppError::BadRequest(msg),
        PlanError::Billing(msg) => AppError::ExternalService(msg),
        PlanError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

fn ensure_practitioner(user: &User) -> Result<(), AppError> {
    if user.can_practice() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only dentists can manage treatment plans".to_string(),
        ))
    }
}

fn actor_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))
}

#[axum::debug_handler]
pub async fn create_plan(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .create_plan(&tenant, request, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn get_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let service = TreatmentPlanningService::new(&state);
    let summary = service
        .plan_summary(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({ "plan": summary })))
}

#[axum::debug_handler]
pub async fn add_item(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<NewItemRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let item = service
        .add_item(&tenant, plan_id, request, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "item": item,
    })))
}

#[axum::debug_handler]
pub async fn cancel_item(
    State(state): State<Arc<AppConfig>>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let item = service
        .cancel_item(&tenant, item_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "item": item,
    })))
}

#[axum::debug_handler]
pub async fn approve_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;
    let approver = actor_uuid(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .approve_plan(&tenant, plan_id, approver, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn cancel_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .cancel_plan(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

/// Patients answer for themselves; the front desk may record an answer
/// given in person.
async fn ensure_may_answer(
    service: &TreatmentPlanningService,
    tenant: &TenantContext,
    plan_id: Uuid,
    user: &User,
    token: &str,
) -> Result<(), AppError> {
    if user.can_manage_front_desk() {
        return Ok(());
    }
    let plan = service
        .get_plan(tenant, plan_id, token)
        .await
        .map_err(map_plan_error)?;
    if plan.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to answer for this plan".to_string(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn accept_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<AcceptPlanRequest>,
) -> Result<Json<Value>, AppError> {
    let service = TreatmentPlanningService::new(&state);
    ensure_may_answer(&service, &tenant, plan_id, &user, auth.token()).await?;

    let plan = service
        .record_acceptance(&tenant, plan_id, request, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn reject_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let service = TreatmentPlanningService::new(&state);
    ensure_may_answer(&service, &tenant, plan_id, &user, auth.token()).await?;

    let plan = service
        .record_rejection(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn start_execution(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .start_execution(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn pause_execution(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .pause_execution(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn resume_execution(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let plan = service
        .resume_execution(&tenant, plan_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn execute_item(
    State(state): State<Arc<AppConfig>>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;
    let executed_by = actor_uuid(&user)?;

    let service = TreatmentPlanningService::new(&state);
    let item = service
        .record_item_execution(&tenant, item_id, executed_by, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "item": item,
    })))
}

#[axum::debug_handler]
pub async fn record_session(
    State(state): State<Arc<AppConfig>>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<RecordSessionRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;
    let performed_by = actor_uuid(&user)?;

    let service = TreatmentProgressService::new(&state);
    let session = service
        .record_session(&tenant, item_id, request, performed_by, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({
        "success": true,
        "session": session,
    })))
}

#[axum::debug_handler]
pub async fn get_item_sessions(
    State(state): State<Arc<AppConfig>>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let service = TreatmentProgressService::new(&state);
    let sessions = service
        .item_sessions(&tenant, item_id, auth.token())
        .await
        .map_err(map_plan_error)?;

    Ok(Json(json!({ "sessions": sessions })))
}

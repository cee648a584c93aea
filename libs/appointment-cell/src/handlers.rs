// libs/appointment-cell/src/handlers.rs
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
    AppointmentError, AttachPlanRequest, CancelAppointmentRequest, ConfirmAppointmentRequest,
    CreateAppointmentRequest, RecordDiagnosisRequest, StartConsultationRequest,
};
use crate::services::scheduling::AppointmentSchedulingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::InvalidStatusTransition(status) => AppError::Conflict(format!(
            "Appointment cannot be modified in current status: {}",
            status
        )),
        AppointmentError::MissingMotive => {
            AppError::BadRequest("A consultation cannot start without a recorded motive".to_string())
        }
        AppointmentError::MissingDiagnosis => {
            AppError::BadRequest("A diagnosis text is required".to_string())
        }
        AppointmentError::OutstandingBalance(balance) => AppError::Conflict(format!(
            "Appointment has an outstanding balance of {}",
            balance
        )),
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::Billing(msg) => AppError::ExternalService(msg),
        AppointmentError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

fn ensure_front_desk(user: &User) -> Result<(), AppError> {
    if user.can_manage_front_desk() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only admins and receptionists can manage scheduling".to_string(),
        ))
    }
}

fn ensure_practitioner(user: &User) -> Result<(), AppError> {
    if user.can_practice() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only dentists can drive clinical transitions".to_string(),
        ))
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients may request their own appointment; staff may book for anyone
    let is_own_booking = request.patient_id.to_string() == user.id;
    if !is_own_booking && !user.can_manage_front_desk() {
        return Err(AppError::Forbidden(
            "Not authorized to book for this patient".to_string(),
        ));
    }

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .create_appointment(&tenant, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .get_appointment(&tenant, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<ConfirmAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_front_desk(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .confirm_appointment(&tenant, appointment_id, request, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn mark_arrived(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_front_desk(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .mark_arrived(&tenant, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<StartConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .start_consultation(&tenant, appointment_id, request, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn record_diagnosis(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<RecordDiagnosisRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .record_diagnosis(&tenant, appointment_id, request, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn attach_plan(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<AttachPlanRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_practitioner(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .attach_plan(&tenant, appointment_id, request.plan_id, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    if !user.can_practice() && !user.can_manage_front_desk() {
        return Err(AppError::Forbidden(
            "Not authorized to complete appointments".to_string(),
        ));
    }

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .complete_appointment(&tenant, appointment_id, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients may cancel their own appointment; checked against the row
    let service = AppointmentSchedulingService::new(&state);
    if !user.can_manage_front_desk() {
        let appointment = service
            .get_appointment(&tenant, appointment_id, auth.token())
            .await
            .map_err(map_appointment_error)?;
        if appointment.patient_id.to_string() != user.id {
            return Err(AppError::Forbidden(
                "Not authorized to cancel this appointment".to_string(),
            ));
        }
    }

    let appointment = service
        .cancel_appointment(&tenant, appointment_id, request, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, AppError> {
    ensure_front_desk(&user)?;

    let service = AppointmentSchedulingService::new(&state);
    let appointment = service
        .mark_no_show(&tenant, appointment_id, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

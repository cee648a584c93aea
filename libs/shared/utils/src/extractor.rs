use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::tenant::TenantContext;

use crate::jwt::validate_token;

/// Authenticates the bearer token and resolves the clinic scope, inserting
/// `User` and `TenantContext` into the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth("Invalid authorization header format".to_string()));
    }

    let token = &auth_value[7..];

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    let tenant = resolve_tenant(&user, &request)?;

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(tenant);

    Ok(next.run(request).await)
}

/// Tenant comes from the token's app metadata; `X-Clinic-Id` is accepted as
/// a fallback for service-to-service calls whose tokens carry no clinic.
fn resolve_tenant(user: &User, request: &Request<Body>) -> Result<TenantContext, AppError> {
    let raw = match &user.tenant_id {
        Some(id) => id.clone(),
        None => request
            .headers()
            .get("X-Clinic-Id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Auth("No clinic scope in token or headers".to_string()))?,
    };

    let tenant_id = Uuid::parse_str(&raw)
        .map_err(|_| AppError::BadRequest(format!("Invalid clinic id: {}", raw)))?;

    Ok(TenantContext::new(tenant_id))
}

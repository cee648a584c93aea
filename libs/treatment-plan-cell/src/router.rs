// libs/treatment-plan-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn treatment_plan_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_plan))
        .route("/{plan_id}", get(handlers::get_plan))
        .route("/{plan_id}/items", post(handlers::add_item))
        // Approval axis
        .route("/{plan_id}/approve", post(handlers::approve_plan))
        .route("/{plan_id}/cancel", post(handlers::cancel_plan))
        // Patient acceptance
        .route("/{plan_id}/accept", post(handlers::accept_plan))
        .route("/{plan_id}/reject", post(handlers::reject_plan))
        // Execution axis
        .route("/{plan_id}/start", post(handlers::start_execution))
        .route("/{plan_id}/pause", post(handlers::pause_execution))
        .route("/{plan_id}/resume", post(handlers::resume_execution))
        // Items and sessions
        .route("/items/{item_id}/execute", post(handlers::execute_item))
        .route("/items/{item_id}/cancel", post(handlers::cancel_item))
        .route("/items/{item_id}/sessions", post(handlers::record_session))
        .route("/items/{item_id}/sessions", get(handlers::get_item_sessions))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn billing_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_payment))
        .route("/{payment_id}", get(handlers::get_payment))
        .route("/{payment_id}/process", post(handlers::process_payment))
        .route("/{payment_id}/approve", post(handlers::approve_payment))
        .route("/{payment_id}/reject", post(handlers::reject_payment))
        .route("/{payment_id}/cancel", post(handlers::cancel_payment))
        .route("/{payment_id}/refund", post(handlers::refund_payment))
        // Balance lookups, recomputed from the ledger per request
        .route("/plans/{plan_id}/balance", get(handlers::get_plan_balance))
        .route(
            "/appointments/{appointment_id}/balance",
            get(handlers::get_appointment_balance),
        )
        .route("/items/{item_id}/balance", get(handlers::get_item_balance))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

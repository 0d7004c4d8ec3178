// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    // All schedule operations require authentication
    let protected_routes = Router::new()
        // Slot availability
        .route("/doctors/{doctor_id}/slots", get(handlers::get_doctor_slots))

        // Schedule definition management
        .route("/", post(handlers::create_schedule))
        .route("/{schedule_id}", patch(handlers::update_schedule))
        .route("/{schedule_id}", delete(handlers::delete_schedule))
        .route("/doctors/{doctor_id}", get(handlers::list_doctor_schedules))

        // Doctor-initiated cancellation workflow
        .route("/cancellation-requests", post(handlers::create_cancellation_request))
        .route("/cancellation-requests", get(handlers::list_cancellation_requests))
        .route("/cancellation-requests/{request_id}/approve", post(handlers::approve_cancellation_request))
        .route("/cancellation-requests/{request_id}/reject", post(handlers::reject_cancellation_request))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

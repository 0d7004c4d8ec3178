// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/{booking_id}", get(handlers::get_booking))
        .route("/patients/{patient_id}", get(handlers::list_patient_bookings))
        .route("/doctors/{doctor_id}/day", get(handlers::doctor_day_bookings))

        // Reschedule lifecycle
        .route("/{booking_id}/reschedule-eligibility", get(handlers::check_reschedule_eligibility))
        .route("/{booking_id}/reschedule", post(handlers::reschedule_booking))

        // Cancellation
        .route("/{booking_id}/cancel", post(handlers::cancel_booking))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use booking_cell::router::booking_routes;
use payment_cell::router::payment_routes;
use schedule_cell::router::schedule_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "MediBook API is running!" }))
        .nest("/schedules", schedule_routes(state.clone()))
        .nest("/bookings", booking_routes(state.clone()))
        .nest("/payments", payment_routes(state.clone()))
}

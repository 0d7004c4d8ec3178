// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/prepare", post(handlers::prepare_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // The processor posts here directly; it cannot carry a user token.
    let public_routes = Router::new()
        .route("/notify", post(handlers::payment_notification));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
}

// libs/payment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Form, State},
    Json,
};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{PaymentError, PaymentNotification, PreparePaymentRequest};
use crate::services::gateway::{ConfirmationOutcome, GatewayService};

fn map_payment_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::NotConfigured => {
            AppError::ExternalService("Payment gateway is not configured".to_string())
        }
        PaymentError::InvalidOrderId(_) => AppError::BadRequest(e.to_string()),
        PaymentError::SignatureMismatch(_) => AppError::Auth(e.to_string()),
        PaymentError::BookingNotFound(msg) => AppError::NotFound(msg),
        PaymentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Build a signed checkout redirect for an existing pending booking.
#[axum::debug_handler]
pub async fn prepare_payment(
    State(state): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    Json(request): Json<PreparePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let gateway = GatewayService::new(&state);
    let redirect = gateway.prepare_payment(&request).map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "payment": redirect
    })))
}

/// Server-to-server notification endpoint. Unauthenticated by design;
/// the HMAC signature inside the form body is what we trust.
#[axum::debug_handler]
pub async fn payment_notification(
    State(state): State<Arc<AppConfig>>,
    Form(notification): Form<PaymentNotification>,
) -> Result<Json<Value>, AppError> {
    let gateway = GatewayService::new(&state);
    let outcome = gateway
        .confirm_payment(&notification)
        .await
        .map_err(map_payment_error)?;

    let message = match outcome {
        ConfirmationOutcome::Confirmed => "Booking confirmed",
        ConfirmationOutcome::AlreadyConfirmed => "Booking was already confirmed",
        ConfirmationOutcome::NotPaid => "Payment unsuccessful, booking released",
    };

    Ok(Json(json!({
        "success": true,
        "message": message
    })))
}

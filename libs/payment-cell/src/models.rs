// libs/payment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Processor status code meaning the charge went through.
pub const STATUS_SUCCESS: i32 = 2;
/// Patient backed out on the hosted checkout page.
pub const STATUS_CANCELLED: i32 = -1;
/// Charge attempted and declined.
pub const STATUS_FAILED: i32 = -2;

/// Everything the client needs to hand the patient off to the hosted
/// checkout page: a POST target plus signed form fields. The signature
/// covers the amount so the client cannot tamper with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRedirect {
    pub checkout_url: String,
    pub merchant_id: String,
    pub order_id: String,
    pub items: String,
    pub amount: String,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
    pub signature: String,
}

/// One checkout covers every booking row created together, so the
/// order reference carries all of their ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparePaymentRequest {
    pub booking_ids: Vec<Uuid>,
    pub amount: f64,
    pub items: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// Server-to-server notification from the payment processor. Arrives as
/// form data on a public endpoint, so the signature is the only thing
/// standing between us and a forged confirmation.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub merchant_id: String,
    pub order_id: String,
    pub payment_amount: String,
    pub payment_currency: String,
    pub status_code: i32,
    pub signature: String,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Invalid order reference: {0}")]
    InvalidOrderId(String),

    #[error("Signature verification failed for order {0}")]
    SignatureMismatch(String),

    #[error("Booking not found for order {0}")]
    BookingNotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

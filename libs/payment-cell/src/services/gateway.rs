// libs/payment-cell/src/services/gateway.rs
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    PaymentError, PaymentNotification, PaymentRedirect, PreparePaymentRequest, STATUS_SUCCESS,
};

type HmacSha256 = Hmac<Sha256>;

const ORDER_PREFIX: &str = "MB";

/// Builds signed checkout redirects and settles bookings when the
/// processor notifies us of the outcome.
pub struct GatewayService {
    supabase: SupabaseClient,
    checkout_url: String,
    merchant_id: String,
    merchant_secret: String,
    currency: String,
}

impl GatewayService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            checkout_url: config.payment_checkout_url.clone(),
            merchant_id: config.payment_merchant_id.clone(),
            merchant_secret: config.payment_merchant_secret.clone(),
            currency: config.payment_currency.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.checkout_url.is_empty()
            && !self.merchant_id.is_empty()
            && !self.merchant_secret.is_empty()
    }

    /// Assemble the signed redirect for a pending booking. No network
    /// traffic happens here; the patient's browser carries the form to
    /// the processor.
    pub fn prepare_payment(
        &self,
        request: &PreparePaymentRequest,
    ) -> Result<PaymentRedirect, PaymentError> {
        if !self.is_configured() {
            return Err(PaymentError::NotConfigured);
        }

        if request.booking_ids.is_empty() {
            return Err(PaymentError::InvalidOrderId("no bookings to pay for".to_string()));
        }

        let order_id = format_order_id(&request.booking_ids);
        let amount = format!("{:.2}", request.amount);
        let signature = sign_checkout(
            &self.merchant_secret,
            &self.merchant_id,
            &order_id,
            &amount,
            &self.currency,
        );

        info!("Prepared payment redirect for order {}", order_id);

        Ok(PaymentRedirect {
            checkout_url: self.checkout_url.clone(),
            merchant_id: self.merchant_id.clone(),
            order_id,
            items: request.items.clone(),
            amount,
            currency: self.currency.clone(),
            return_url: request.return_url.clone(),
            cancel_url: request.cancel_url.clone(),
            signature,
        })
    }

    /// Settle the bookings behind a processor notification. Verifies the
    /// signature, then confirms every pending booking in the order's
    /// group. Re-delivered notifications are a no-op.
    pub async fn confirm_payment(
        &self,
        notification: &PaymentNotification,
    ) -> Result<ConfirmationOutcome, PaymentError> {
        if !self.is_configured() {
            return Err(PaymentError::NotConfigured);
        }

        let expected = sign_notification(
            &self.merchant_secret,
            &notification.merchant_id,
            &notification.order_id,
            &notification.payment_amount,
            &notification.payment_currency,
            notification.status_code,
        );
        if expected != notification.signature {
            warn!("Rejected notification with bad signature for order {}", notification.order_id);
            return Err(PaymentError::SignatureMismatch(notification.order_id.clone()));
        }

        let booking_ids = parse_order_id(&notification.order_id)?;
        let id_list = id_filter(&booking_ids);

        // Notifications are unauthenticated, so store access uses the
        // service role rather than a user token.
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/bookings?id=in.({})&select=id,status", id_list),
                None,
                None,
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            return Err(PaymentError::BookingNotFound(notification.order_id.clone()));
        }

        if rows.iter().all(|row| row["status"].as_str() == Some("confirmed")) {
            info!("Order {} already settled, skipping", notification.order_id);
            return Ok(ConfirmationOutcome::AlreadyConfirmed);
        }

        // Settle or abandon exactly the rows named by the order, and only
        // while they still await payment. Filtering by id keeps a second
        // pending booking the patient made the same day untouched. A
        // cancelled group stops occupying capacity, since availability
        // derives from active bookings.
        let target_status = if notification.status_code == STATUS_SUCCESS {
            "confirmed"
        } else {
            "cancelled"
        };
        let patch_path = format!(
            "/rest/v1/bookings?id=in.({})&status=eq.pending_payment",
            id_list,
        );
        let _: Value = self
            .supabase
            .request(
                Method::PATCH,
                &patch_path,
                None,
                Some(json!({ "status": target_status })),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        if notification.status_code == STATUS_SUCCESS {
            info!("Settled order {}", notification.order_id);
            Ok(ConfirmationOutcome::Confirmed)
        } else {
            warn!(
                "Order {} not paid (status code {}), bookings released",
                notification.order_id, notification.status_code
            );
            Ok(ConfirmationOutcome::NotPaid)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    AlreadyConfirmed,
    /// The charge failed or was abandoned; the pending bookings were
    /// cancelled so their slots free up again.
    NotPaid,
}

// ==============================================================================
// ORDER REFERENCE AND SIGNING
// ==============================================================================

/// Join every booking id into the order reference. Underscore is the
/// separator because uuids already use `-` and `+` would decode as a
/// space in the processor's form post.
pub fn format_order_id(booking_ids: &[Uuid]) -> String {
    let joined = booking_ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join("_");
    format!("{}-{}", ORDER_PREFIX, joined)
}

pub fn parse_order_id(order_id: &str) -> Result<Vec<Uuid>, PaymentError> {
    let raw = order_id
        .strip_prefix(ORDER_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| PaymentError::InvalidOrderId(order_id.to_string()))?;
    raw.split('_')
        .map(|part| {
            Uuid::parse_str(part).map_err(|_| PaymentError::InvalidOrderId(order_id.to_string()))
        })
        .collect()
}

fn id_filter(booking_ids: &[Uuid]) -> String {
    booking_ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn hmac_tag(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

pub fn sign_checkout(
    secret: &str,
    merchant_id: &str,
    order_id: &str,
    amount: &str,
    currency: &str,
) -> String {
    hmac_tag(secret, &format!("{}{}{}{}", merchant_id, order_id, amount, currency))
}

pub fn sign_notification(
    secret: &str,
    merchant_id: &str,
    order_id: &str,
    amount: &str,
    currency: &str,
    status_code: i32,
) -> String {
    hmac_tag(
        secret,
        &format!("{}{}{}{}{}", merchant_id, order_id, amount, currency, status_code),
    )
}

// libs/booking-cell/src/services/cancellation.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::error::BookingError;
use crate::models::{Booking, CancelBookingRequest, CancellationRecord};

/// Cancels bookings and records the audit trail. The booking fee is
/// never refunded, whoever cancels and whatever the reason; the record
/// carries an explicit zero so downstream reporting does not have to
/// infer the policy.
pub struct CancellationService {
    supabase: SupabaseClient,
}

impl CancellationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn cancel_booking(
        &self,
        booking: &Booking,
        request: &CancelBookingRequest,
        cancelled_by_role: &str,
        auth_token: &str,
    ) -> Result<CancellationRecord, BookingError> {
        if !request.confirmed {
            return Err(BookingError::ConfirmationRequired);
        }
        if request.reason.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "A cancellation reason is required".to_string(),
            ));
        }
        if !booking.status.is_cancellable() {
            return Err(BookingError::ValidationError(format!(
                "Booking in status {} cannot be cancelled",
                booking.status
            )));
        }
        if booking.date < Utc::now().date_naive() {
            return Err(BookingError::PastDateRejected(booking.date.to_string()));
        }

        let _: Value = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/bookings?id=eq.{}", booking.id),
                Some(auth_token),
                Some(json!({ "status": "cancelled" })),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let records: Vec<CancellationRecord> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/cancellation_records",
                Some(auth_token),
                Some(json!([{
                    "booking_id": booking.id,
                    "reason": request.reason,
                    "cancelled_by_role": cancelled_by_role,
                    "cancelled_at": Utc::now().to_rfc3339(),
                    "refund_amount": 0.0,
                }])),
                Some(return_representation()),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::DatabaseError("Insert returned no rows".to_string()))?;

        info!(
            "Cancelled booking {} by {} (no refund)",
            booking.id, cancelled_by_role
        );

        Ok(record)
    }
}

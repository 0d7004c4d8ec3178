// libs/booking-cell/src/services/booking.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use schedule_cell::models::{ScheduleError, SlotOccurrence, SlotStatus};
use schedule_cell::services::availability::AvailabilityService;
use shared_config::AppConfig;
use shared_database::supabase::{is_conflict, return_representation, SupabaseClient};

use payment_cell::models::{PaymentRedirect, PreparePaymentRequest};
use payment_cell::services::gateway::GatewayService;

use crate::error::BookingError;
use crate::models::{
    Booking, BookingFlowState, BookingResponse, BookingStatus, CreateBookingRequest,
    PaymentMethod, RescheduleAttempt, MAX_SLOTS_PER_BOOKING,
};
use crate::services::slot_lock::SlotLockService;

/// Runs the whole booking pipeline: validation, availability check,
/// lock acquisition, atomic persistence and payment hand-off.
pub struct BookingOrchestrator<'a> {
    config: &'a AppConfig,
    supabase: SupabaseClient,
    locks: SlotLockService,
}

impl<'a> BookingOrchestrator<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            supabase: SupabaseClient::new(config),
            locks: SlotLockService::new(config),
        }
    }

    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        auth_token: &str,
    ) -> Result<BookingResponse, BookingError> {
        validate_create_request(&request)?;

        // First pass without locks, to fail fast on clearly taken slots.
        let slots = self.resolve_slots(&request, auth_token).await?;
        pick_available_slots(&request.slot_numbers, &slots)?;

        self.locks.purge_expired(auth_token).await;
        let held = self
            .locks
            .acquire_slots(
                request.doctor_id,
                request.branch_id,
                request.date,
                &request.slot_numbers,
                auth_token,
            )
            .await?;

        // Everything between lock acquisition and release funnels through
        // one result so the locks always come off.
        let outcome = self.book_under_locks(&request, auth_token).await;
        self.locks.release(&held, auth_token).await;
        outcome
    }

    async fn book_under_locks(
        &self,
        request: &CreateBookingRequest,
        auth_token: &str,
    ) -> Result<BookingResponse, BookingError> {
        // Second availability pass: another request may have won a slot
        // between our first check and lock acquisition.
        let slots = self.resolve_slots(request, auth_token).await?;
        let picked = pick_available_slots(&request.slot_numbers, &slots)?;

        let status = match request.payment_method {
            PaymentMethod::Online => BookingStatus::PendingPayment,
            PaymentMethod::Cash => BookingStatus::Confirmed,
        };

        let rows: Vec<Value> = picked
            .iter()
            .map(|occurrence| {
                json!({
                    "doctor_id": request.doctor_id,
                    "branch_id": request.branch_id,
                    "schedule_id": occurrence.schedule_id,
                    "date": request.date,
                    "slot_number": occurrence.slot_number,
                    "patient_id": request.patient_id,
                    "token_number": occurrence.slot_number,
                    "status": status.to_string(),
                    "payment_method": request.payment_method,
                    "booking_fee": self.config.booking_fee,
                })
            })
            .collect();

        // One array insert is one transaction on the store side, so a
        // multi-slot booking lands entirely or not at all.
        let created: Vec<Booking> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/bookings",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    BookingError::SlotConflict(
                        "One of the requested slots was just taken".to_string(),
                    )
                } else {
                    BookingError::DatabaseError(e.to_string())
                }
            })?;

        for booking in &created {
            self.insert_attempt_row(&RescheduleAttempt::fresh(booking.id), auth_token)
                .await;
        }

        let total_amount = self.config.booking_fee * created.len() as f64;
        let token_numbers: Vec<i32> = created.iter().map(|b| b.token_number).collect();

        let payment = match request.payment_method {
            PaymentMethod::Cash => None,
            PaymentMethod::Online => Some(self.prepare_redirect(request, &created, total_amount)?),
        };

        info!(
            "Created {} booking(s) for patient {} with doctor {} on {}",
            created.len(),
            request.patient_id,
            request.doctor_id,
            request.date
        );

        Ok(BookingResponse {
            bookings: created,
            token_numbers,
            total_amount,
            payment,
        })
    }

    fn prepare_redirect(
        &self,
        request: &CreateBookingRequest,
        created: &[Booking],
        total_amount: f64,
    ) -> Result<PaymentRedirect, BookingError> {
        if created.is_empty() {
            return Err(BookingError::DatabaseError("Insert returned no rows".to_string()));
        }

        // The order reference names every row in the group, so the
        // processor's notification settles exactly these bookings.
        let gateway = GatewayService::new(self.config);
        gateway
            .prepare_payment(&PreparePaymentRequest {
                booking_ids: created.iter().map(|b| b.id).collect(),
                amount: total_amount,
                items: format!("Appointment booking on {}", request.date),
                return_url: request.return_url.clone().unwrap_or_default(),
                cancel_url: request.cancel_url.clone().unwrap_or_default(),
            })
            .map_err(|e| BookingError::PaymentFailed(e.to_string()))
    }

    async fn insert_attempt_row(&self, attempt: &RescheduleAttempt, auth_token: &str) {
        let result: Result<Value, _> = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/reschedule_attempts",
                Some(auth_token),
                Some(json!({
                    "appointment_id": attempt.appointment_id,
                    "attempts_used": attempt.attempts_used,
                    "max_attempts": attempt.max_attempts,
                    "is_admin_cancelled_origin": attempt.is_admin_cancelled_origin,
                })),
            )
            .await;
        if let Err(e) = result {
            // The booking itself stands; a missing counter row reads as
            // the default budget on the next lookup.
            warn!(
                "Failed to record attempt counter for booking {}: {}",
                attempt.appointment_id, e
            );
        }
    }

    async fn resolve_slots(
        &self,
        request: &CreateBookingRequest,
        auth_token: &str,
    ) -> Result<Vec<SlotOccurrence>, BookingError> {
        let availability = AvailabilityService::new(self.config);
        availability
            .slots_for_date(request.doctor_id, request.branch_id, request.date, auth_token)
            .await
            .map_err(map_availability_error)
    }

    // --------------------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------------------

    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let rows: Vec<Booking> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/bookings?id=eq.{}", booking_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| BookingError::NotFound(format!("Booking {} not found", booking_id)))
    }

    pub async fn list_patient_bookings(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        self.supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/bookings?patient_id=eq.{}&order=date.desc,slot_number.asc",
                    patient_id
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))
    }

    /// The doctor's queue for one day, ordered by token number.
    pub async fn doctor_day_bookings(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        self.supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/bookings?doctor_id=eq.{}&branch_id=eq.{}&date=eq.{}&order=token_number.asc",
                    doctor_id, branch_id, date
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))
    }
}

pub fn map_availability_error(e: ScheduleError) -> BookingError {
    match e {
        ScheduleError::NotFound(msg) => BookingError::NotFound(msg),
        ScheduleError::ValidationError(msg) => BookingError::ValidationError(msg),
        other => BookingError::DatabaseError(other.to_string()),
    }
}

// ==============================================================================
// PURE VALIDATION
// ==============================================================================

pub fn validate_create_request(request: &CreateBookingRequest) -> Result<(), BookingError> {
    let claimed = request.flow_state.unwrap_or(BookingFlowState::Confirm);
    let next = BookingFlowState::after_confirm(request.payment_method);
    if claimed != BookingFlowState::Confirm || !claimed.can_transition_to(next) {
        return Err(BookingError::InvalidFlowTransition {
            from: claimed.to_string(),
            to: next.to_string(),
        });
    }

    if request.slot_numbers.is_empty() {
        return Err(BookingError::ValidationError(
            "At least one slot must be requested".to_string(),
        ));
    }
    if request.slot_numbers.len() > MAX_SLOTS_PER_BOOKING {
        return Err(BookingError::CapacityExceeded {
            requested: request.slot_numbers.len(),
            max: MAX_SLOTS_PER_BOOKING,
        });
    }

    let mut deduped = request.slot_numbers.clone();
    deduped.sort_unstable();
    deduped.dedup();
    if deduped.len() != request.slot_numbers.len() {
        return Err(BookingError::ValidationError(
            "Duplicate slot numbers in request".to_string(),
        ));
    }

    if request.date < Utc::now().date_naive() {
        return Err(BookingError::PastDateRejected(request.date.to_string()));
    }

    if request.payment_method == PaymentMethod::Online
        && (request.return_url.as_deref().unwrap_or("").is_empty()
            || request.cancel_url.as_deref().unwrap_or("").is_empty())
    {
        return Err(BookingError::ValidationError(
            "Online payment requires return_url and cancel_url".to_string(),
        ));
    }

    Ok(())
}

/// Resolve each requested slot number against the day's grid, rejecting
/// anything missing or taken. Returns the matched occurrences so callers
/// never have to look a slot up twice.
pub fn pick_available_slots(
    requested: &[i32],
    slots: &[SlotOccurrence],
) -> Result<Vec<SlotOccurrence>, BookingError> {
    requested
        .iter()
        .map(|slot| {
            match slots.iter().find(|s| s.slot_number == *slot) {
                None => Err(BookingError::ValidationError(format!(
                    "Slot {} does not exist on that day",
                    slot
                ))),
                Some(occurrence) if occurrence.status != SlotStatus::Available => {
                    Err(BookingError::SlotConflict(format!(
                        "Slot {} is not available",
                        slot
                    )))
                }
                Some(occurrence) => Ok(occurrence.clone()),
            }
        })
        .collect()
}

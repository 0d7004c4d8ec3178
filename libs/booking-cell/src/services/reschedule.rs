// libs/booking-cell/src/services/reschedule.rs
use chrono::{DateTime, Duration, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use schedule_cell::services::availability::AvailabilityService;
use shared_config::AppConfig;
use shared_database::supabase::{is_conflict, return_representation, SupabaseClient};

use crate::error::BookingError;
use crate::models::{
    Booking, BookingStatus, RescheduleAttempt, RescheduleEligibility, RescheduleRequest,
    RESCHEDULE_ADVANCE_NOTICE_HOURS,
};
use crate::services::booking::{map_availability_error, pick_available_slots};
use crate::services::slot_lock::SlotLockService;

/// Budget granted to a booking created by a branch-side reschedule, so
/// patients displaced by a schedule cancellation still get a move of
/// their own afterwards.
const ELEVATED_MAX_ATTEMPTS: i32 = 2;

pub struct RescheduleEngine<'a> {
    config: &'a AppConfig,
    supabase: SupabaseClient,
    locks: SlotLockService,
}

impl<'a> RescheduleEngine<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            supabase: SupabaseClient::new(config),
            locks: SlotLockService::new(config),
        }
    }

    pub async fn check_eligibility(
        &self,
        booking: &Booking,
        auth_token: &str,
    ) -> Result<RescheduleEligibility, BookingError> {
        let attempt = self.get_attempt(booking.id, auth_token).await?;
        let start = self.appointment_start(booking, auth_token).await;
        Ok(eligibility_for(booking.status, start, &attempt, Utc::now()))
    }

    /// Move a booking to a new slot. The original booking is cancelled
    /// and a replacement created; payment carries over, no new charge.
    /// `branch_override` skips the patient-side budget and notice rules
    /// and grants the replacement an elevated budget.
    pub async fn execute_reschedule(
        &self,
        booking: &Booking,
        request: &RescheduleRequest,
        branch_override: bool,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        if !request.confirmed {
            return Err(BookingError::ConfirmationRequired);
        }
        if request.new_date < Utc::now().date_naive() {
            return Err(BookingError::PastDateRejected(request.new_date.to_string()));
        }

        let attempt = self.get_attempt(booking.id, auth_token).await?;
        if !branch_override {
            let start = self.appointment_start(booking, auth_token).await;
            let eligibility = eligibility_for(booking.status, start, &attempt, Utc::now());
            if !eligibility.can_reschedule {
                return Err(BookingError::IneligibleForReschedule {
                    reason: eligibility
                        .reason
                        .unwrap_or_else(|| "Not eligible".to_string()),
                });
            }
        } else if booking.status != BookingStatus::Confirmed {
            // Branch-side moves skip budget and notice rules but still
            // only apply to confirmed bookings.
            return Err(BookingError::IneligibleForReschedule {
                reason: format!("Booking in status {} cannot be rescheduled", booking.status),
            });
        }

        let availability = AvailabilityService::new(self.config);
        let slots = availability
            .slots_for_date(booking.doctor_id, booking.branch_id, request.new_date, auth_token)
            .await
            .map_err(map_availability_error)?;
        let occurrence = pick_available_slots(&[request.new_slot_number], &slots)?
            .pop()
            .ok_or_else(|| {
                BookingError::ValidationError(format!(
                    "Slot {} does not exist on that day",
                    request.new_slot_number
                ))
            })?;

        self.locks.purge_expired(auth_token).await;
        let held = self
            .locks
            .acquire_slots(
                booking.doctor_id,
                booking.branch_id,
                request.new_date,
                &[request.new_slot_number],
                auth_token,
            )
            .await?;

        let outcome = self
            .move_under_lock(booking, request, &attempt, branch_override, occurrence.schedule_id, auth_token)
            .await;
        self.locks.release(&held, auth_token).await;
        outcome
    }

    async fn move_under_lock(
        &self,
        booking: &Booking,
        request: &RescheduleRequest,
        attempt: &RescheduleAttempt,
        branch_override: bool,
        new_schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        // Re-check under the lock
        let availability = AvailabilityService::new(self.config);
        let slots = availability
            .slots_for_date(booking.doctor_id, booking.branch_id, request.new_date, auth_token)
            .await
            .map_err(map_availability_error)?;
        pick_available_slots(&[request.new_slot_number], &slots)?;

        // Payment state carries over verbatim: a confirmed booking stays
        // confirmed, a pending one stays pending against the same order.
        let row = json!([{
            "doctor_id": booking.doctor_id,
            "branch_id": booking.branch_id,
            "schedule_id": new_schedule_id,
            "date": request.new_date,
            "slot_number": request.new_slot_number,
            "patient_id": booking.patient_id,
            "token_number": request.new_slot_number,
            "status": booking.status.to_string(),
            "payment_method": booking.payment_method,
            "booking_fee": booking.booking_fee,
        }]);

        let created: Vec<Booking> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/bookings",
                Some(auth_token),
                Some(row),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    BookingError::SlotConflict("The new slot was just taken".to_string())
                } else {
                    BookingError::DatabaseError(e.to_string())
                }
            })?;

        let replacement = created
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::DatabaseError("Insert returned no rows".to_string()))?;

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

        // Audit trail for the vacated booking; best effort, the move
        // itself already happened.
        let audit: Result<Value, _> = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/cancellation_records",
                Some(auth_token),
                Some(json!({
                    "booking_id": booking.id,
                    "reason": request.reason.clone().unwrap_or_else(|| "rescheduled".to_string()),
                    "cancelled_by_role": if branch_override { "branch_staff" } else { "patient" },
                    "cancelled_at": chrono::Utc::now().to_rfc3339(),
                    "refund_amount": 0.0,
                })),
            )
            .await;
        if let Err(e) = audit {
            warn!("Failed to record reschedule audit for {}: {}", booking.id, e);
        }

        let next_attempt = if branch_override {
            RescheduleAttempt {
                appointment_id: replacement.id,
                attempts_used: 0,
                max_attempts: ELEVATED_MAX_ATTEMPTS,
                is_admin_cancelled_origin: true,
            }
        } else {
            RescheduleAttempt {
                appointment_id: replacement.id,
                attempts_used: attempt.attempts_used + 1,
                max_attempts: attempt.max_attempts,
                is_admin_cancelled_origin: attempt.is_admin_cancelled_origin,
            }
        };
        self.insert_attempt(&next_attempt, auth_token).await;

        info!(
            "Rescheduled booking {} to {} slot {} as {}",
            booking.id, request.new_date, request.new_slot_number, replacement.id
        );

        Ok(replacement)
    }

    async fn insert_attempt(&self, attempt: &RescheduleAttempt, auth_token: &str) {
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
            warn!(
                "Failed to record attempt counter for booking {}: {}",
                attempt.appointment_id, e
            );
        }
    }

    async fn get_attempt(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<RescheduleAttempt, BookingError> {
        let rows: Vec<RescheduleAttempt> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/reschedule_attempts?appointment_id=eq.{}", booking_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        // A booking without a counter row carries the default budget.
        Ok(rows
            .into_iter()
            .next()
            .unwrap_or_else(|| RescheduleAttempt::fresh(booking_id)))
    }

    /// Best-effort resolution of the appointment's wall-clock start from
    /// the slot grid. Falls back to midnight when the slot is no longer
    /// on the grid (for example after a schedule change).
    async fn appointment_start(&self, booking: &Booking, auth_token: &str) -> DateTime<Utc> {
        let availability = AvailabilityService::new(self.config);
        let start_time = availability
            .slots_for_date(booking.doctor_id, booking.branch_id, booking.date, auth_token)
            .await
            .ok()
            .and_then(|slots| {
                slots
                    .iter()
                    .find(|s| s.slot_number == booking.slot_number)
                    .map(|s| s.start_time)
            })
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());

        booking.date.and_time(start_time).and_utc()
    }
}

// ==============================================================================
// PURE ELIGIBILITY
// ==============================================================================

pub fn eligibility_for(
    status: BookingStatus,
    appointment_start: DateTime<Utc>,
    attempt: &RescheduleAttempt,
    now: DateTime<Utc>,
) -> RescheduleEligibility {
    let ineligible = |reason: String| RescheduleEligibility {
        can_reschedule: false,
        reason: Some(reason),
        remaining_attempts: attempt.remaining(),
        max_attempts: attempt.max_attempts,
        is_admin_cancelled_origin: attempt.is_admin_cancelled_origin,
    };

    if status != BookingStatus::Confirmed {
        return ineligible(format!("Booking in status {} cannot be rescheduled", status));
    }

    if appointment_start - now < Duration::hours(RESCHEDULE_ADVANCE_NOTICE_HOURS) {
        return ineligible(format!(
            "Appointments can only be rescheduled at least {} hours in advance",
            RESCHEDULE_ADVANCE_NOTICE_HOURS
        ));
    }

    if attempt.remaining() == 0 {
        return ineligible(format!(
            "Reschedule limit reached ({} of {} used)",
            attempt.attempts_used, attempt.max_attempts
        ));
    }

    RescheduleEligibility {
        can_reschedule: true,
        reason: None,
        remaining_attempts: attempt.remaining(),
        max_attempts: attempt.max_attempts,
        is_admin_cancelled_origin: attempt.is_admin_cancelled_origin,
    }
}

// libs/booking-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use payment_cell::models::PaymentRedirect;

/// Hard cap on simultaneous slot reservations in one request.
pub const MAX_SLOTS_PER_BOOKING: usize = 5;

/// Minimum advance notice before an appointment may still be moved.
pub const RESCHEDULE_ADVANCE_NOTICE_HOURS: i64 = 24;

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub slot_number: i32,
    pub patient_id: Uuid,
    /// Patient-facing queue identifier; equals the slot number and is
    /// unique per (doctor, branch, date).
    pub token_number: i32,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub booking_fee: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    CheckedIn,
    InSession,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Statuses that occupy slot capacity.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::NoShow)
    }

    /// Terminal bookings are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::PendingPayment)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::PendingPayment => write!(f, "pending_payment"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::CheckedIn => write!(f, "checked_in"),
            BookingStatus::InSession => write!(f, "in_session"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    Cash,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    pub date: NaiveDate,
    pub slot_numbers: Vec<i32>,
    pub payment_method: PaymentMethod,
    /// Wizard stage the client claims to be at; must be `confirm`.
    pub flow_state: Option<BookingFlowState>,
    /// Where the payment processor should send the patient back to.
    /// Required for online payment.
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub bookings: Vec<Booking>,
    pub token_numbers: Vec<i32>,
    pub total_amount: f64,
    /// Present only for online payment; the caller auto-submits this
    /// form to hand the patient to the processor.
    pub payment: Option<PaymentRedirect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub new_date: NaiveDate,
    pub new_slot_number: i32,
    pub reason: Option<String>,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
    pub confirmed: bool,
}

// ==============================================================================
// RESCHEDULE MODELS
// ==============================================================================

/// Attempt counter for a booking. Defaults to one attempt; bookings whose
/// origin was moved by branch or doctor action carry an elevated budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAttempt {
    pub appointment_id: Uuid,
    pub attempts_used: i32,
    pub max_attempts: i32,
    pub is_admin_cancelled_origin: bool,
}

impl RescheduleAttempt {
    pub fn fresh(appointment_id: Uuid) -> Self {
        Self {
            appointment_id,
            attempts_used: 0,
            max_attempts: 1,
            is_admin_cancelled_origin: false,
        }
    }

    pub fn remaining(&self) -> i32 {
        (self.max_attempts - self.attempts_used).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleEligibility {
    pub can_reschedule: bool,
    pub reason: Option<String>,
    pub remaining_attempts: i32,
    pub max_attempts: i32,
    pub is_admin_cancelled_origin: bool,
}

// ==============================================================================
// CANCELLATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub booking_id: Uuid,
    pub reason: String,
    pub cancelled_by_role: String,
    pub cancelled_at: DateTime<Utc>,
    /// Always zero: booking fees are non-refundable regardless of actor
    /// or reason.
    pub refund_amount: f64,
}

// ==============================================================================
// BOOKING FLOW STATE MACHINE
// ==============================================================================

/// The client-side booking wizard, made explicit. States only change
/// through [`BookingFlowState::can_transition_to`]-sanctioned moves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingFlowState {
    Search,
    Select,
    Confirm,
    Payment,
    Success,
}

impl BookingFlowState {
    pub fn can_transition_to(&self, target: BookingFlowState) -> bool {
        use BookingFlowState::*;
        matches!(
            (self, target),
            (Search, Select)
                | (Select, Confirm)
                | (Select, Search)
                | (Confirm, Select)
                | (Confirm, Payment)
                // Cash bookings skip the payment leg entirely.
                | (Confirm, Success)
                | (Payment, Success)
        )
    }

    /// Next state after submitting a confirmed booking.
    pub fn after_confirm(payment_method: PaymentMethod) -> BookingFlowState {
        match payment_method {
            PaymentMethod::Online => BookingFlowState::Payment,
            PaymentMethod::Cash => BookingFlowState::Success,
        }
    }
}

impl fmt::Display for BookingFlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingFlowState::Search => write!(f, "search"),
            BookingFlowState::Select => write!(f, "select"),
            BookingFlowState::Confirm => write!(f, "confirm"),
            BookingFlowState::Payment => write!(f, "payment"),
            BookingFlowState::Success => write!(f, "success"),
        }
    }
}

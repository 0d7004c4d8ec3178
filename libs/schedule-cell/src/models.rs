// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SCHEDULE DEFINITION MODELS
// ==============================================================================

/// Recurring availability template for one doctor at one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub weekday: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub max_patients_per_slot_window: i32,
    pub recurrence_type: RecurrenceType,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleDefinition {
    /// Number of bookable slots in the daily window.
    pub fn slot_count(&self) -> i32 {
        let window = (self.end_time - self.start_time).num_minutes();
        if self.slot_duration_minutes <= 0 {
            return 0;
        }
        (window / self.slot_duration_minutes as i64) as i32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Weekly,
    Biweekly,
    Once,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Inactive,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "active"),
            ScheduleStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    pub weekday: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub max_patients_per_slot_window: Option<i32>,
    pub recurrence_type: Option<RecurrenceType>,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_duration_minutes: Option<i32>,
    pub max_patients_per_slot_window: Option<i32>,
    pub valid_until: Option<NaiveDate>,
    pub status: Option<ScheduleStatus>,
}

/// Outcome of a delete request. Definitions still referenced by future
/// bookings are deactivated instead of removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScheduleOutcome {
    Deleted,
    Deactivated,
}

// ==============================================================================
// SLOT OCCURRENCE MODELS (computed, never persisted)
// ==============================================================================

/// One numbered slot on a concrete date, derived from a ScheduleDefinition
/// plus that date's bookings. Start/end times are estimates only: actual
/// consultation start drifts with how long earlier patients take, so
/// callers must present them as approximate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotOccurrence {
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub slot_number: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub booked_count: i32,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<SlotOccurrence>,
}

/// Minimal booking projection used when computing occupancy.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotBookingRow {
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub slot_number: i32,
}

// ==============================================================================
// SCHEDULE CANCELLATION WORKFLOW MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCancellationRequest {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
    pub cancel_date: NaiveDate,
    pub cancel_end_date: Option<NaiveDate>,
    pub reason: String,
    pub status: CancellationRequestStatus,
    pub created_at: DateTime<Utc>,
}

impl ScheduleCancellationRequest {
    /// Whether this request covers `date` for its schedule.
    pub fn covers(&self, schedule_id: Uuid, date: NaiveDate) -> bool {
        self.schedule_id == schedule_id
            && date >= self.cancel_date
            && date <= self.cancel_end_date.unwrap_or(self.cancel_date)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for CancellationRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationRequestStatus::Pending => write!(f, "pending"),
            CancellationRequestStatus::Approved => write!(f, "approved"),
            CancellationRequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCancellationRequest {
    /// None together with `entire_day` means every schedule the doctor
    /// holds on the date.
    pub schedule_id: Option<Uuid>,
    pub cancel_date: NaiveDate,
    pub cancel_end_date: Option<NaiveDate>,
    pub reason: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Can only cancel future dates: {0}")]
    PastDateRejected(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Request is {current}, only pending requests can be {action}")]
    InvalidTransition { current: CancellationRequestStatus, action: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

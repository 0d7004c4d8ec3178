use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Slot no longer available: {0}")]
    SlotConflict(String),

    #[error("Too many slots requested: {requested} exceeds the limit of {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot reschedule: {reason}")]
    IneligibleForReschedule { reason: String },

    #[error("Explicit confirmation is required; the booking fee is non-refundable")]
    ConfirmationRequired,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Date has already passed: {0}")]
    PastDateRejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid booking flow transition from {from} to {to}")]
    InvalidFlowTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

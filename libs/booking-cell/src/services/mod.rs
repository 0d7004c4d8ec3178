pub mod booking;
pub mod cancellation;
pub mod reschedule;
pub mod slot_lock;

pub mod availability;
pub mod day_cancellation;
pub mod schedule;

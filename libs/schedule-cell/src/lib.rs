pub mod models;
pub mod services;
pub mod handlers;
pub mod router;

pub use router::schedule_routes;

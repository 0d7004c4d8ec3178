// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{AccessPolicy, Capability, User};
use shared_models::error::AppError;

use crate::error::BookingError;
use crate::models::{Booking, CancelBookingRequest, CreateBookingRequest, RescheduleRequest};
use crate::services::booking::BookingOrchestrator;
use crate::services::cancellation::CancellationService;
use crate::services::reschedule::RescheduleEngine;

#[derive(Debug, Deserialize)]
pub struct DayQueryParams {
    pub branch_id: Uuid,
    pub date: NaiveDate,
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::SlotConflict(msg) => AppError::Conflict(msg),
        BookingError::CapacityExceeded { .. } => AppError::BadRequest(e.to_string()),
        BookingError::NotFound(msg) => AppError::NotFound(msg),
        BookingError::IneligibleForReschedule { .. } => AppError::Conflict(e.to_string()),
        BookingError::ConfirmationRequired => AppError::ConfirmationRequired(e.to_string()),
        BookingError::PaymentFailed(msg) => AppError::PaymentRequired(msg),
        BookingError::PastDateRejected(_) => AppError::BadRequest(e.to_string()),
        BookingError::Unauthorized(msg) => AppError::Auth(msg),
        BookingError::InvalidFlowTransition { .. } => AppError::BadRequest(e.to_string()),
        BookingError::ValidationError(msg) => AppError::ValidationError(msg),
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn can_view_booking(user: &User, booking: &Booking) -> bool {
    if user.id == booking.patient_id.to_string() || user.id == booking.doctor_id.to_string() {
        return true;
    }
    if user.role().can(Capability::CancelAny) {
        return true;
    }
    user.role().can(Capability::ViewBranchBookings) && user.branch_id == Some(booking.branch_id)
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    if !AccessPolicy::can_book_for(&user, request.patient_id) {
        return Err(AppError::Auth(
            "Not authorized to book for this patient".to_string(),
        ));
    }

    let orchestrator = BookingOrchestrator::new(&state);
    let response = orchestrator
        .create_booking(request, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": response,
        "message": "Booking created"
    })))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let orchestrator = BookingOrchestrator::new(&state);
    let booking = orchestrator
        .get_booking(booking_id, auth.token())
        .await
        .map_err(map_booking_error)?;

    if !can_view_booking(&user, &booking) {
        return Err(AppError::Auth(
            "Not authorized to view this booking".to_string(),
        ));
    }

    Ok(Json(json!({ "booking": booking })))
}

#[axum::debug_handler]
pub async fn list_patient_bookings(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_own = user.id == patient_id.to_string();
    if !is_own && !user.role().can(Capability::ViewBranchBookings) {
        return Err(AppError::Auth(
            "Not authorized to view this patient's bookings".to_string(),
        ));
    }

    let orchestrator = BookingOrchestrator::new(&state);
    let bookings = orchestrator
        .list_patient_bookings(patient_id, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "bookings": bookings,
        "total": bookings.len()
    })))
}

/// The day queue for a doctor: bookings ordered by token number.
#[axum::debug_handler]
pub async fn doctor_day_bookings(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<DayQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_self = user.id == doctor_id.to_string();
    let is_branch_viewer = user.role().can(Capability::ViewBranchBookings)
        && (user.branch_id == Some(params.branch_id) || user.role().can(Capability::CancelAny));
    if !is_self && !is_branch_viewer {
        return Err(AppError::Auth(
            "Not authorized to view this doctor's bookings".to_string(),
        ));
    }

    let orchestrator = BookingOrchestrator::new(&state);
    let bookings = orchestrator
        .doctor_day_bookings(doctor_id, params.branch_id, params.date, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": params.date,
        "bookings": bookings,
        "total": bookings.len()
    })))
}

// ==============================================================================
// RESCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_reschedule_eligibility(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let orchestrator = BookingOrchestrator::new(&state);
    let booking = orchestrator
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    if !AccessPolicy::can_reschedule(&user, booking.patient_id, booking.branch_id) {
        return Err(AppError::Auth(
            "Not authorized to reschedule this booking".to_string(),
        ));
    }

    let engine = RescheduleEngine::new(&state);
    let eligibility = engine
        .check_eligibility(&booking, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "booking_id": booking_id,
        "eligibility": eligibility
    })))
}

#[axum::debug_handler]
pub async fn reschedule_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let orchestrator = BookingOrchestrator::new(&state);
    let booking = orchestrator
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    if !AccessPolicy::can_reschedule(&user, booking.patient_id, booking.branch_id) {
        return Err(AppError::Auth(
            "Not authorized to reschedule this booking".to_string(),
        ));
    }

    // Branch-side moves (after an approved schedule cancellation, say)
    // bypass the patient budget and leave an elevated one behind.
    let branch_override =
        user.role().is_branch_actor() && user.id != booking.patient_id.to_string();

    let engine = RescheduleEngine::new(&state);
    let replacement = engine
        .execute_reschedule(&booking, &request, branch_override, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": replacement,
        "previous_booking_id": booking_id,
        "message": "Booking rescheduled; the original payment carries over"
    })))
}

// ==============================================================================
// CANCELLATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let orchestrator = BookingOrchestrator::new(&state);
    let booking = orchestrator
        .get_booking(booking_id, token)
        .await
        .map_err(map_booking_error)?;

    if !AccessPolicy::can_cancel(&user, booking.patient_id, booking.branch_id) {
        return Err(AppError::Auth(
            "Not authorized to cancel this booking".to_string(),
        ));
    }

    let service = CancellationService::new(&state);
    let record = service
        .cancel_booking(&booking, &request, user.role().as_str(), token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "cancellation": record,
        "message": "Booking cancelled; the booking fee is not refunded"
    })))
}

// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Capability, User};
use shared_models::error::AppError;

use crate::models::{
    CancellationRequestStatus, CreateCancellationRequest, CreateScheduleRequest,
    ScheduleError, UpdateScheduleRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::day_cancellation::DayCancellationService;
use crate::services::schedule::ScheduleService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub branch_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleListParams {
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CancellationCreateParams {
    #[serde(default)]
    pub entire_day: bool,
}

#[derive(Debug, Deserialize)]
pub struct CancellationListParams {
    pub status: Option<CancellationRequestStatus>,
}

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::NotFound(msg) => AppError::NotFound(msg),
        ScheduleError::PastDateRejected(msg) => {
            AppError::BadRequest(format!("Can only cancel future dates: {}", msg))
        }
        ScheduleError::ValidationError(msg) => AppError::ValidationError(msg),
        ScheduleError::InvalidTransition { .. } => AppError::BadRequest(e.to_string()),
        ScheduleError::Unauthorized(msg) => AppError::Auth(msg),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_owner_or_admin(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    let is_owner = user.role().can(Capability::ManageOwnSchedules)
        && user.id == doctor_id.to_string();
    let is_admin = user.role().can(Capability::ApproveScheduleCancellation);
    if !is_owner && !is_admin {
        return Err(AppError::Auth(
            "Not authorized to manage schedules for this doctor".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// SLOT AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<SlotQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let availability = AvailabilityService::new(&state);

    let days = availability
        .get_available_slots(doctor_id, params.branch_id, params.from, params.to, token)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "branch_id": params.branch_id,
        "days": days,
        "note": "Slot times are estimates; actual start drifts with prior consultation length"
    })))
}

// ==============================================================================
// SCHEDULE DEFINITION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_owner_or_admin(&user, request.doctor_id)?;

    let service = ScheduleService::new(&state);
    let definition = service
        .create_schedule(request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": definition,
        "message": "Schedule definition created"
    })))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ScheduleService::new(&state);

    let current = service.get_schedule(schedule_id, token).await
        .map_err(map_schedule_error)?;
    require_owner_or_admin(&user, current.doctor_id)?;

    let updated = service
        .update_schedule(schedule_id, request, token)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": updated,
        "message": "Schedule definition updated"
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ScheduleService::new(&state);

    let current = service.get_schedule(schedule_id, token).await
        .map_err(map_schedule_error)?;
    require_owner_or_admin(&user, current.doctor_id)?;

    let outcome = service
        .delete_schedule(schedule_id, token)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "outcome": outcome,
        "message": "Schedule definition removed"
    })))
}

#[axum::debug_handler]
pub async fn list_doctor_schedules(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<ScheduleListParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(&state);
    let schedules = service
        .list_schedules(doctor_id, params.branch_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "schedules": schedules,
        "total": schedules.len()
    })))
}

// ==============================================================================
// SCHEDULE CANCELLATION WORKFLOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_cancellation_request(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<CancellationCreateParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateCancellationRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.role().can(Capability::RequestScheduleCancellation) {
        return Err(AppError::Auth(
            "Only doctors may request schedule cancellations".to_string(),
        ));
    }
    let doctor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))?;

    let service = DayCancellationService::new(&state);
    let token = auth.token();

    if params.entire_day {
        let created = service
            .create_entire_day_requests(doctor_id, request, token)
            .await
            .map_err(map_schedule_error)?;
        let total = created.len();
        return Ok(Json(json!({
            "success": true,
            "requests": created,
            "total": total,
            "message": "Cancellation requested for the entire day, pending approval"
        })));
    }

    let created = service
        .create_request(doctor_id, request, token)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "request": created,
        "message": "Cancellation requested, pending approval"
    })))
}

#[axum::debug_handler]
pub async fn approve_cancellation_request(
    State(state): State<Arc<AppConfig>>,
    Path(request_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.role().can(Capability::ApproveScheduleCancellation) {
        return Err(AppError::Auth(
            "Only administrators may approve cancellation requests".to_string(),
        ));
    }

    let service = DayCancellationService::new(&state);
    let updated = service
        .approve_request(request_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "request": updated,
        "message": "Cancellation request approved; covered slots are now blocked"
    })))
}

#[axum::debug_handler]
pub async fn reject_cancellation_request(
    State(state): State<Arc<AppConfig>>,
    Path(request_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.role().can(Capability::ApproveScheduleCancellation) {
        return Err(AppError::Auth(
            "Only administrators may reject cancellation requests".to_string(),
        ));
    }

    let service = DayCancellationService::new(&state);
    let updated = service
        .reject_request(request_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "request": updated,
        "message": "Cancellation request rejected"
    })))
}

#[axum::debug_handler]
pub async fn list_cancellation_requests(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<CancellationListParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    // Doctors only see their own requests; administrators see everything.
    let doctor_filter = if user.role().can(Capability::ApproveScheduleCancellation) {
        None
    } else if user.role().can(Capability::RequestScheduleCancellation) {
        let doctor_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))?;
        Some(doctor_id)
    } else {
        return Err(AppError::Auth(
            "Not authorized to view cancellation requests".to_string(),
        ));
    };

    let service = DayCancellationService::new(&state);
    let requests = service
        .list_requests(params.status, doctor_filter, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len()
    })))
}

// libs/schedule-cell/src/services/schedule.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    CreateScheduleRequest, DeleteScheduleOutcome, RecurrenceType, ScheduleDefinition,
    ScheduleError, ScheduleStatus, UpdateScheduleRequest,
};
use crate::services::availability::ACTIVE_BOOKING_STATUSES;

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create a recurring schedule definition for a doctor/branch pairing.
    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<ScheduleDefinition, ScheduleError> {
        debug!("Creating schedule definition for doctor {} at branch {}",
               request.doctor_id, request.branch_id);

        validate_schedule_shape(&request)?;
        self.ensure_no_active_overlap(
            request.doctor_id,
            request.branch_id,
            request.weekday,
            request.valid_from,
            request.valid_until,
            None,
            auth_token,
        )
        .await?;

        let row = json!({
            "doctor_id": request.doctor_id,
            "branch_id": request.branch_id,
            "weekday": request.weekday,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "slot_duration_minutes": request.slot_duration_minutes,
            "max_patients_per_slot_window": request.max_patients_per_slot_window.unwrap_or(1),
            "recurrence_type": request.recurrence_type.unwrap_or(RecurrenceType::Weekly),
            "valid_from": request.valid_from,
            "valid_until": request.valid_until,
            "status": "active",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/schedule_definitions",
            Some(auth_token),
            Some(row),
            Some(return_representation()),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let created = result.into_iter().next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create schedule definition".to_string()))?;

        let definition: ScheduleDefinition = serde_json::from_value(created)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule definition: {}", e)))?;

        info!("Schedule definition {} created", definition.id);
        Ok(definition)
    }

    /// Partial update. Only provided fields are written.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<ScheduleDefinition, ScheduleError> {
        debug!("Updating schedule definition {}", schedule_id);

        let current = self.get_schedule(schedule_id, auth_token).await?;

        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        if start >= end {
            return Err(ScheduleError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let next_status = request.status.unwrap_or(current.status);
        if next_status == ScheduleStatus::Active {
            self.ensure_no_active_overlap(
                current.doctor_id,
                current.branch_id,
                current.weekday,
                current.valid_from,
                request.valid_until.unwrap_or(current.valid_until),
                Some(schedule_id),
                auth_token,
            )
            .await?;
        }

        let mut update = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update.insert("start_time".to_string(), json!(start_time.format("%H:%M:%S").to_string()));
        }
        if let Some(end_time) = request.end_time {
            update.insert("end_time".to_string(), json!(end_time.format("%H:%M:%S").to_string()));
        }
        if let Some(duration) = request.slot_duration_minutes {
            if duration <= 0 {
                return Err(ScheduleError::ValidationError(
                    "Slot duration must be positive".to_string(),
                ));
            }
            update.insert("slot_duration_minutes".to_string(), json!(duration));
        }
        if let Some(max_patients) = request.max_patients_per_slot_window {
            update.insert("max_patients_per_slot_window".to_string(), json!(max_patients));
        }
        if let Some(valid_until) = request.valid_until {
            update.insert("valid_until".to_string(), json!(valid_until));
        }
        if let Some(status) = request.status {
            update.insert("status".to_string(), json!(status));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/schedule_definitions?id=eq.{}", schedule_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update)),
            Some(return_representation()),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let updated = result.into_iter().next()
            .ok_or_else(|| ScheduleError::NotFound(format!("Schedule {} not found", schedule_id)))?;

        serde_json::from_value(updated)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule definition: {}", e)))
    }

    /// Delete a definition, or soft-deactivate it when future active
    /// bookings still reference it.
    pub async fn delete_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<DeleteScheduleOutcome, ScheduleError> {
        debug!("Deleting schedule definition {}", schedule_id);

        // Ensure it exists before deciding how to remove it.
        self.get_schedule(schedule_id, auth_token).await?;

        let today = Utc::now().date_naive();
        let path = format!(
            "/rest/v1/bookings?schedule_id=eq.{}&date=gte.{}&status=in.{}&select=id&limit=1",
            schedule_id, today, ACTIVE_BOOKING_STATUSES
        );
        let future_bookings: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if !future_bookings.is_empty() {
            info!("Schedule {} has future bookings, deactivating instead of deleting", schedule_id);
            let update = UpdateScheduleRequest {
                start_time: None,
                end_time: None,
                slot_duration_minutes: None,
                max_patients_per_slot_window: None,
                valid_until: None,
                status: Some(ScheduleStatus::Inactive),
            };
            self.update_schedule(schedule_id, update, auth_token).await?;
            return Ok(DeleteScheduleOutcome::Deactivated);
        }

        let path = format!("/rest/v1/schedule_definitions?id=eq.{}", schedule_id);
        let _: Vec<Value> = self.supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        info!("Schedule definition {} deleted", schedule_id);
        Ok(DeleteScheduleOutcome::Deleted)
    }

    /// Token numbers and lock keys are derived per (doctor, branch,
    /// date), so two active definitions on the same weekday with
    /// intersecting validity windows would hand out colliding slot
    /// numbers. Reject the write instead.
    #[allow(clippy::too_many_arguments)]
    async fn ensure_no_active_overlap(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        weekday: i32,
        valid_from: chrono::NaiveDate,
        valid_until: chrono::NaiveDate,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_definitions?doctor_id=eq.{}&branch_id=eq.{}&weekday=eq.{}&status=eq.active",
            doctor_id, branch_id, weekday
        );
        let existing: Vec<ScheduleDefinition> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        for other in existing {
            if Some(other.id) == exclude_id {
                continue;
            }
            if validity_windows_overlap(valid_from, valid_until, other.valid_from, other.valid_until) {
                return Err(ScheduleError::ValidationError(format!(
                    "An active schedule ({}) already covers weekday {} for this doctor and branch between {} and {}",
                    other.id, weekday, other.valid_from, other.valid_until
                )));
            }
        }
        Ok(())
    }

    pub async fn get_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleDefinition, ScheduleError> {
        let path = format!("/rest/v1/schedule_definitions?id=eq.{}", schedule_id);
        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next()
            .ok_or_else(|| ScheduleError::NotFound(format!("Schedule {} not found", schedule_id)))?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule definition: {}", e)))
    }

    pub async fn list_schedules(
        &self,
        doctor_id: Uuid,
        branch_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleDefinition>, ScheduleError> {
        let mut path = format!(
            "/rest/v1/schedule_definitions?doctor_id=eq.{}&order=weekday.asc,start_time.asc",
            doctor_id
        );
        if let Some(branch_id) = branch_id {
            path.push_str(&format!("&branch_id=eq.{}", branch_id));
        }

        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleDefinition>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule definition: {}", e)))
    }
}

/// Closed-interval intersection of two validity windows.
fn validity_windows_overlap(
    a_from: chrono::NaiveDate,
    a_until: chrono::NaiveDate,
    b_from: chrono::NaiveDate,
    b_until: chrono::NaiveDate,
) -> bool {
    a_from <= b_until && b_from <= a_until
}

fn validate_schedule_shape(request: &CreateScheduleRequest) -> Result<(), ScheduleError> {
    if request.weekday < 0 || request.weekday > 6 {
        return Err(ScheduleError::ValidationError(
            "Weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    if request.start_time >= request.end_time {
        return Err(ScheduleError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }
    if request.slot_duration_minutes <= 0 {
        return Err(ScheduleError::ValidationError(
            "Slot duration must be positive".to_string(),
        ));
    }
    let window = (request.end_time - request.start_time).num_minutes();
    if (request.slot_duration_minutes as i64) > window {
        return Err(ScheduleError::ValidationError(
            "Slot duration does not fit inside the daily window".to_string(),
        ));
    }
    if request.valid_from > request.valid_until {
        return Err(ScheduleError::ValidationError(
            "Validity start must not be after validity end".to_string(),
        ));
    }
    if request.max_patients_per_slot_window.unwrap_or(1) < 1 {
        return Err(ScheduleError::ValidationError(
            "Slot capacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

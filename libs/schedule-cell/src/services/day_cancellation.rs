// libs/schedule-cell/src/services/day_cancellation.rs
//
// Doctor-initiated requests to block one occurrence or an entire day of
// their own recurring schedule. Requests start pending and only take
// effect on availability once an administrator approves them.

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    CancellationRequestStatus, CreateCancellationRequest, ScheduleCancellationRequest,
    ScheduleError,
};
use crate::services::availability::definition_applies_on;
use crate::services::schedule::ScheduleService;

pub struct DayCancellationService {
    supabase: SupabaseClient,
    schedule_service: ScheduleService,
}

impl DayCancellationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedule_service: ScheduleService::new(config),
        }
    }

    /// Create a cancellation request for a single schedule occurrence or
    /// date range. The schedule must belong to the requesting doctor.
    pub async fn create_request(
        &self,
        doctor_id: Uuid,
        request: CreateCancellationRequest,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        let schedule_id = request.schedule_id.ok_or_else(|| {
            ScheduleError::ValidationError("schedule_id is required".to_string())
        })?;

        validate_request_dates(&request)?;

        let schedule = self.schedule_service.get_schedule(schedule_id, auth_token).await?;
        if schedule.doctor_id != doctor_id {
            warn!("Doctor {} attempted to cancel schedule {} they do not own",
                  doctor_id, schedule_id);
            return Err(ScheduleError::Unauthorized(
                "Doctors may only cancel their own schedules".to_string(),
            ));
        }

        self.insert_request(doctor_id, schedule_id, &request, auth_token).await
    }

    /// Bulk convenience: cancel every schedule the doctor holds on the
    /// date. Implemented as independent single-day requests so an
    /// administrator can approve or reject each one on its own.
    pub async fn create_entire_day_requests(
        &self,
        doctor_id: Uuid,
        request: CreateCancellationRequest,
        auth_token: &str,
    ) -> Result<Vec<ScheduleCancellationRequest>, ScheduleError> {
        validate_request_dates(&request)?;

        let schedules = self.schedule_service
            .list_schedules(doctor_id, None, auth_token)
            .await?;

        let affected: Vec<_> = schedules.iter()
            .filter(|def| definition_applies_on(def, request.cancel_date))
            .collect();

        if affected.is_empty() {
            return Err(ScheduleError::NotFound(format!(
                "Doctor {} has no schedule occurrence on {}",
                doctor_id, request.cancel_date
            )));
        }

        let single_day = CreateCancellationRequest {
            cancel_end_date: None,
            ..request.clone()
        };

        let mut created = Vec::with_capacity(affected.len());
        for def in affected {
            let row = self
                .insert_request(doctor_id, def.id, &single_day, auth_token)
                .await?;
            created.push(row);
        }

        info!("Doctor {} requested cancellation of entire day {} ({} schedules)",
              doctor_id, request.cancel_date, created.len());
        Ok(created)
    }

    /// Administrator approval. Approved requests suppress slot
    /// availability for the covered dates; the transition is terminal.
    pub async fn approve_request(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        self.transition_request(request_id, CancellationRequestStatus::Approved, auth_token).await
    }

    /// Administrator rejection. Terminal; has no effect on availability.
    pub async fn reject_request(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        self.transition_request(request_id, CancellationRequestStatus::Rejected, auth_token).await
    }

    pub async fn get_request(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        let path = format!("/rest/v1/schedule_cancellation_requests?id=eq.{}", request_id);
        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            ScheduleError::NotFound(format!("Cancellation request {} not found", request_id))
        })?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse cancellation request: {}", e)))
    }

    pub async fn list_requests(
        &self,
        status: Option<CancellationRequestStatus>,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleCancellationRequest>, ScheduleError> {
        let mut path = "/rest/v1/schedule_cancellation_requests?order=created_at.desc".to_string();
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }

        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleCancellationRequest>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse cancellation request: {}", e)))
    }

    async fn insert_request(
        &self,
        doctor_id: Uuid,
        schedule_id: Uuid,
        request: &CreateCancellationRequest,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        debug!("Creating schedule cancellation request for schedule {} on {}",
               schedule_id, request.cancel_date);

        let row = json!({
            "doctor_id": doctor_id,
            "schedule_id": schedule_id,
            "cancel_date": request.cancel_date,
            "cancel_end_date": request.cancel_end_date,
            "reason": request.reason,
            "status": "pending",
            "created_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/schedule_cancellation_requests",
            Some(auth_token),
            Some(row),
            Some(return_representation()),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let created = result.into_iter().next().ok_or_else(|| {
            ScheduleError::DatabaseError("Failed to create cancellation request".to_string())
        })?;

        serde_json::from_value(created)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse cancellation request: {}", e)))
    }

    async fn transition_request(
        &self,
        request_id: Uuid,
        target: CancellationRequestStatus,
        auth_token: &str,
    ) -> Result<ScheduleCancellationRequest, ScheduleError> {
        let current = self.get_request(request_id, auth_token).await?;

        // pending -> approved / rejected only; both are terminal.
        if current.status != CancellationRequestStatus::Pending {
            return Err(ScheduleError::InvalidTransition {
                current: current.status,
                action: target.to_string(),
            });
        }

        let path = format!("/rest/v1/schedule_cancellation_requests?id=eq.{}", request_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "status": target })),
            Some(return_representation()),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let updated = result.into_iter().next().ok_or_else(|| {
            ScheduleError::NotFound(format!("Cancellation request {} not found", request_id))
        })?;

        info!("Cancellation request {} transitioned to {}", request_id, target);
        serde_json::from_value(updated)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse cancellation request: {}", e)))
    }
}

fn validate_request_dates(request: &CreateCancellationRequest) -> Result<(), ScheduleError> {
    let today = Utc::now().date_naive();
    if request.cancel_date < today {
        return Err(ScheduleError::PastDateRejected(format!(
            "{} has already passed", request.cancel_date
        )));
    }
    if let Some(end) = request.cancel_end_date {
        if end < request.cancel_date {
            return Err(ScheduleError::ValidationError(
                "Range end must not be before range start".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request_for(date: chrono::NaiveDate) -> CreateCancellationRequest {
        CreateCancellationRequest {
            schedule_id: Some(Uuid::new_v4()),
            cancel_date: date,
            cancel_end_date: None,
            reason: "personal leave".to_string(),
        }
    }

    #[test]
    fn rejects_past_dates() {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        assert!(matches!(
            validate_request_dates(&request_for(yesterday)),
            Err(ScheduleError::PastDateRejected(_))
        ));
    }

    #[test]
    fn accepts_today_and_future_dates() {
        let today = Utc::now().date_naive();
        assert!(validate_request_dates(&request_for(today)).is_ok());
        assert!(validate_request_dates(&request_for(today + Duration::days(14))).is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let today = Utc::now().date_naive();
        let mut request = request_for(today + Duration::days(7));
        request.cancel_end_date = Some(today + Duration::days(3));
        assert!(matches!(
            validate_request_dates(&request),
            Err(ScheduleError::ValidationError(_))
        ));
    }
}

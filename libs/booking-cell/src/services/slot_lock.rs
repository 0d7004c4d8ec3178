// libs/booking-cell/src/services/slot_lock.rs
use chrono::{Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{is_conflict, SupabaseClient};

use crate::error::BookingError;

/// How long an acquired lock stays valid before it is considered leaked.
const LOCK_TTL_SECONDS: i64 = 30;

/// Short-lived advisory locks over individual slots, backed by a unique
/// key column in the store. Two requests racing for the same slot both
/// try to insert the same key; the store lets exactly one through.
pub struct SlotLockService {
    supabase: SupabaseClient,
}

impl SlotLockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Acquire locks for every requested slot, in sorted order so two
    /// requests contending for overlapping slot sets cannot deadlock
    /// against each other. On any failure, everything already acquired
    /// is released before returning.
    pub async fn acquire_slots(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        date: NaiveDate,
        slot_numbers: &[i32],
        auth_token: &str,
    ) -> Result<Vec<String>, BookingError> {
        let mut ordered: Vec<i32> = slot_numbers.to_vec();
        ordered.sort_unstable();

        let mut acquired: Vec<String> = Vec::with_capacity(ordered.len());
        for slot in ordered {
            let key = lock_key(doctor_id, branch_id, date, slot);
            let expires_at = Utc::now() + Duration::seconds(LOCK_TTL_SECONDS);

            let result: Result<Value, _> = self
                .supabase
                .request(
                    Method::POST,
                    "/rest/v1/slot_locks",
                    Some(auth_token),
                    Some(json!({
                        "lock_key": key,
                        "expires_at": expires_at.to_rfc3339(),
                    })),
                )
                .await;

            match result {
                Ok(_) => {
                    debug!("Acquired slot lock {}", key);
                    acquired.push(key);
                }
                Err(e) if is_conflict(&e) => {
                    self.release(&acquired, auth_token).await;
                    return Err(BookingError::SlotConflict(format!(
                        "Slot {} on {} is being booked by someone else",
                        slot, date
                    )));
                }
                Err(e) => {
                    self.release(&acquired, auth_token).await;
                    return Err(BookingError::DatabaseError(e.to_string()));
                }
            }
        }

        Ok(acquired)
    }

    /// Release locks by key. Failures are logged and swallowed: a leaked
    /// lock expires on its own via the TTL.
    pub async fn release(&self, keys: &[String], auth_token: &str) {
        for key in keys {
            let result: Result<Value, _> = self
                .supabase
                .request(
                    Method::DELETE,
                    &format!("/rest/v1/slot_locks?lock_key=eq.{}", urlencoding::encode(key)),
                    Some(auth_token),
                    None,
                )
                .await;
            if let Err(e) = result {
                warn!("Failed to release slot lock {}: {}", key, e);
            }
        }
    }

    /// Sweep locks whose TTL has lapsed. Run opportunistically before
    /// acquisition so abandoned locks do not block slots forever.
    pub async fn purge_expired(&self, auth_token: &str) {
        // RFC 3339 offsets carry a '+', which must not read as a space
        // in the query string.
        let now = urlencoding::encode(&Utc::now().to_rfc3339()).into_owned();
        let result: Result<Value, _> = self
            .supabase
            .request(
                Method::DELETE,
                &format!("/rest/v1/slot_locks?expires_at=lt.{}", now),
                Some(auth_token),
                None,
            )
            .await;
        if let Err(e) = result {
            warn!("Failed to purge expired slot locks: {}", e);
        }
    }
}

pub fn lock_key(doctor_id: Uuid, branch_id: Uuid, date: NaiveDate, slot_number: i32) -> String {
    format!("{}:{}:{}:{}", doctor_id, branch_id, date, slot_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable_per_slot() {
        let doctor = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        let a = lock_key(doctor, branch, date, 3);
        let b = lock_key(doctor, branch, date, 3);
        let c = lock_key(doctor, branch, date, 4);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(":3"));
    }
}

// libs/schedule-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate, Weekday};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DaySlots, RecurrenceType, ScheduleCancellationRequest, ScheduleDefinition,
    ScheduleError, ScheduleStatus, SlotBookingRow, SlotOccurrence, SlotStatus,
};

/// Booking statuses that occupy a slot. Cancelled and no-show rows release
/// their capacity back to availability.
pub const ACTIVE_BOOKING_STATUSES: &str =
    "(pending_payment,confirmed,checked_in,in_session,completed)";

const MAX_RANGE_DAYS: i64 = 62;

/// Expands recurring schedule definitions into dated, numbered slots and
/// tags each one available, booked, or blocked.
pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Per-date slot grids for a doctor at a branch over a date range.
    ///
    /// Fails with `NotFound` when the doctor/branch pairing has no active
    /// schedule definitions at all; dates with no matching occurrence
    /// simply produce an empty slot list.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DaySlots>, ScheduleError> {
        debug!("Calculating slots for doctor {} at branch {} from {} to {}",
               doctor_id, branch_id, from, to);

        if from > to {
            return Err(ScheduleError::ValidationError(
                "Range start must not be after range end".to_string(),
            ));
        }
        if (to - from).num_days() > MAX_RANGE_DAYS {
            return Err(ScheduleError::ValidationError(format!(
                "Date range too large, maximum is {} days", MAX_RANGE_DAYS
            )));
        }

        let definitions = self.get_definitions(doctor_id, branch_id, auth_token).await?;
        if definitions.is_empty() {
            return Err(ScheduleError::NotFound(format!(
                "No active schedule definitions for doctor {} at branch {}",
                doctor_id, branch_id
            )));
        }

        let booked = self.get_active_bookings(doctor_id, branch_id, from, to, auth_token).await?;
        let approved_blocks = self.get_approved_cancellations(doctor_id, auth_token).await?;

        let mut days = Vec::new();
        let mut date = from;
        while date <= to {
            let slots = build_day_slots(&definitions, date, &booked, &approved_blocks);
            days.push(DaySlots { date, slots });
            date = date.succ_opt().ok_or_else(|| {
                ScheduleError::ValidationError("Date out of calendar range".to_string())
            })?;
        }

        Ok(days)
    }

    /// Slot grid for a single date. Used by the booking side to validate
    /// requested slot numbers.
    pub async fn slots_for_date(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotOccurrence>, ScheduleError> {
        let days = self
            .get_available_slots(doctor_id, branch_id, date, date, auth_token)
            .await?;
        Ok(days.into_iter().next().map(|d| d.slots).unwrap_or_default())
    }

    async fn get_definitions(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ScheduleDefinition>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_definitions?doctor_id=eq.{}&branch_id=eq.{}&status=eq.active&order=weekday.asc,start_time.asc",
            doctor_id, branch_id
        );
        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleDefinition>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule definition: {}", e)))
    }

    async fn get_active_bookings(
        &self,
        doctor_id: Uuid,
        branch_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotBookingRow>, ScheduleError> {
        let path = format!(
            "/rest/v1/bookings?doctor_id=eq.{}&branch_id=eq.{}&date=gte.{}&date=lte.{}&status=in.{}&select=schedule_id,date,slot_number",
            doctor_id, branch_id, from, to, ACTIVE_BOOKING_STATUSES
        );
        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SlotBookingRow>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse booking row: {}", e)))
    }

    async fn get_approved_cancellations(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ScheduleCancellationRequest>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_cancellation_requests?doctor_id=eq.{}&status=eq.approved",
            doctor_id
        );
        let result: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleCancellationRequest>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse cancellation request: {}", e)))
    }
}

// ==============================================================================
// PURE SLOT EXPANSION
// ==============================================================================

/// 0 = Sunday .. 6 = Saturday, matching the stored weekday column.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Whether a definition produces an occurrence on `date`. Dates outside
/// the validity window yield no occurrence rather than an error.
pub fn definition_applies_on(def: &ScheduleDefinition, date: NaiveDate) -> bool {
    if def.status != ScheduleStatus::Active {
        return false;
    }
    if date < def.valid_from || date > def.valid_until {
        return false;
    }
    if weekday_index(date) != def.weekday {
        return false;
    }
    match def.recurrence_type {
        RecurrenceType::Weekly => true,
        // Weeks counted from the validity start; week 0 is on.
        RecurrenceType::Biweekly => {
            let weeks = (date - def.valid_from).num_days().div_euclid(7);
            weeks % 2 == 0
        }
        RecurrenceType::Once => date == def.valid_from,
    }
}

/// All slots of one definition on one date, before occupancy is applied.
pub fn expand_definition(def: &ScheduleDefinition, date: NaiveDate) -> Vec<SlotOccurrence> {
    let duration = chrono::Duration::minutes(def.slot_duration_minutes as i64);
    (1..=def.slot_count())
        .map(|slot_number| {
            let start = def.start_time + duration * (slot_number - 1);
            SlotOccurrence {
                schedule_id: def.id,
                date,
                slot_number,
                start_time: start,
                end_time: start + duration,
                capacity: def.max_patients_per_slot_window,
                booked_count: 0,
                status: SlotStatus::Available,
            }
        })
        .collect()
}

/// Compose the slot grid for one date: expand every applicable definition,
/// then mark slots booked or blocked. Computed into a fresh structure per
/// query; nothing here is cached.
pub fn build_day_slots(
    definitions: &[ScheduleDefinition],
    date: NaiveDate,
    booked: &[SlotBookingRow],
    approved_blocks: &[ScheduleCancellationRequest],
) -> Vec<SlotOccurrence> {
    let mut slots = Vec::new();

    for def in definitions.iter().filter(|d| definition_applies_on(d, date)) {
        let blocked = approved_blocks.iter().any(|req| req.covers(def.id, date));

        for mut slot in expand_definition(def, date) {
            if blocked {
                slot.status = SlotStatus::Blocked;
            } else {
                let count = booked.iter()
                    .filter(|b| {
                        b.schedule_id == def.id && b.date == date && b.slot_number == slot.slot_number
                    })
                    .count() as i32;
                // booked_count never exceeds capacity in a consistent store
                slot.booked_count = count.min(slot.capacity);
                if count >= slot.capacity {
                    slot.status = SlotStatus::Booked;
                }
            }
            slots.push(slot);
        }
    }

    slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.slot_number.cmp(&b.slot_number)));
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};

    fn monday_definition() -> ScheduleDefinition {
        ScheduleDefinition {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            weekday: 1, // Monday
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            slot_duration_minutes: 30,
            max_patients_per_slot_window: 1,
            recurrence_type: RecurrenceType::Weekly,
            valid_from: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2025, 12, 29).unwrap(),
            status: ScheduleStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn three_hour_window_with_half_hour_slots_yields_six_slots() {
        let def = monday_definition();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(); // a Monday
        let slots = expand_definition(&def, date);

        assert_eq!(slots.len(), 6);
        assert_eq!(slots.first().unwrap().slot_number, 1);
        assert_eq!(slots.last().unwrap().slot_number, 6);

        let expected_starts = ["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"];
        for (slot, expected) in slots.iter().zip(expected_starts) {
            assert_eq!(slot.start_time.format("%H:%M").to_string(), expected);
        }
        assert_eq!(
            slots[5].end_time,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn wrong_weekday_produces_no_occurrence() {
        let def = monday_definition();
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        assert!(!definition_applies_on(&def, tuesday));
    }

    #[test]
    fn date_outside_validity_window_produces_no_occurrence() {
        let def = monday_definition();
        let before = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap(); // Monday, too early
        let after = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(); // Monday, too late
        assert!(!definition_applies_on(&def, before));
        assert!(!definition_applies_on(&def, after));
    }

    #[test]
    fn biweekly_schedule_skips_alternate_weeks() {
        let mut def = monday_definition();
        def.recurrence_type = RecurrenceType::Biweekly;

        let week0 = def.valid_from; // 2025-01-06, Monday
        let week1 = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
        let week2 = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();

        assert!(definition_applies_on(&def, week0));
        assert!(!definition_applies_on(&def, week1));
        assert!(definition_applies_on(&def, week2));
    }

    #[test]
    fn once_schedule_only_fires_on_valid_from() {
        let mut def = monday_definition();
        def.recurrence_type = RecurrenceType::Once;

        assert!(definition_applies_on(&def, def.valid_from));
        let next_week = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
        assert!(!definition_applies_on(&def, next_week));
    }

    #[test]
    fn booked_slots_are_marked_and_capacity_respected() {
        let def = monday_definition();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let booked = vec![SlotBookingRow {
            schedule_id: def.id,
            date,
            slot_number: 3,
        }];

        let slots = build_day_slots(&[def], date, &booked, &[]);
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[2].status, SlotStatus::Booked);
        assert_eq!(slots[2].booked_count, 1);
        assert!(slots.iter().all(|s| s.booked_count <= s.capacity));
        assert_eq!(slots[0].status, SlotStatus::Available);
    }

    #[test]
    fn approved_cancellation_blocks_the_whole_day() {
        let def = monday_definition();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let block = ScheduleCancellationRequest {
            id: Uuid::new_v4(),
            doctor_id: def.doctor_id,
            schedule_id: def.id,
            cancel_date: date,
            cancel_end_date: None,
            reason: "conference".to_string(),
            status: crate::models::CancellationRequestStatus::Approved,
            created_at: Utc::now(),
        };

        let slots = build_day_slots(&[def], date, &[], &[block]);
        assert!(slots.iter().all(|s| s.status == SlotStatus::Blocked));
    }

    #[test]
    fn cancellation_range_covers_intermediate_dates() {
        let def = monday_definition();
        let block = ScheduleCancellationRequest {
            id: Uuid::new_v4(),
            doctor_id: def.doctor_id,
            schedule_id: def.id,
            cancel_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            cancel_end_date: Some(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()),
            reason: "leave".to_string(),
            status: crate::models::CancellationRequestStatus::Approved,
            created_at: Utc::now(),
        };

        assert!(block.covers(def.id, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
        assert!(!block.covers(def.id, NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()));
        assert!(!block.covers(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
    }
}

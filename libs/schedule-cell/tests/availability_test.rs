// Slot availability against a wiremock stand-in for the REST store.
use chrono::{Datelike, Duration, Utc, Weekday};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use schedule_cell::models::{ScheduleError, SlotStatus};
use schedule_cell::services::availability::AvailabilityService;
use shared_utils::test_utils::{MockStoreResponses, TestConfig};

fn next_monday() -> chrono::NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }
    date
}

async fn mock_empty_bookings_and_cancellations(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_cancellation_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn three_hour_window_expands_to_six_half_hour_slots() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let branch_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4();
    let monday = next_monday();

    // Monday 09:00-12:00, 30 minute slots
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::schedule_definition_row(
                schedule_id, doctor_id, branch_id, 1, "09:00:00", "12:00:00", 30,
            )
        ])))
        .mount(&server)
        .await;
    mock_empty_bookings_and_cancellations(&server).await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let days = service
        .get_available_slots(doctor_id, branch_id, monday, monday, "token")
        .await
        .unwrap();

    assert_eq!(days.len(), 1);
    let slots = &days[0].slots;
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0].start_time.to_string(), "09:00:00");
    assert_eq!(slots[5].start_time.to_string(), "11:30:00");
    assert!(slots.iter().all(|s| s.status == SlotStatus::Available));
    assert_eq!(slots.iter().map(|s| s.slot_number).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn active_bookings_mark_slots_as_booked() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let branch_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4();
    let monday = next_monday();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::schedule_definition_row(
                schedule_id, doctor_id, branch_id, 1, "09:00:00", "12:00:00", 30,
            )
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "schedule_id": schedule_id, "date": monday, "slot_number": 2 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_cancellation_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let days = service
        .get_available_slots(doctor_id, branch_id, monday, monday, "token")
        .await
        .unwrap();

    let slots = &days[0].slots;
    assert_eq!(slots[1].slot_number, 2);
    assert_eq!(slots[1].status, SlotStatus::Booked);
    assert_eq!(slots[1].booked_count, 1);
    assert_eq!(slots[0].status, SlotStatus::Available);
}

#[tokio::test]
async fn approved_cancellation_blocks_the_whole_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let branch_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4();
    let monday = next_monday();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::schedule_definition_row(
                schedule_id, doctor_id, branch_id, 1, "09:00:00", "12:00:00", 30,
            )
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_cancellation_requests"))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::cancellation_request_row(
                Uuid::new_v4(), doctor_id, schedule_id, &monday.to_string(), "approved",
            )
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let days = service
        .get_available_slots(doctor_id, branch_id, monday, monday, "token")
        .await
        .unwrap();

    assert!(days[0].slots.iter().all(|s| s.status == SlotStatus::Blocked));
}

#[tokio::test]
async fn no_active_definitions_is_not_found() {
    let server = MockServer::start().await;
    let monday = next_monday();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let result = service
        .get_available_slots(Uuid::new_v4(), Uuid::new_v4(), monday, monday, "token")
        .await;

    assert_matches!(result, Err(ScheduleError::NotFound(_)));
}

#[tokio::test]
async fn inverted_date_range_is_rejected_without_store_traffic() {
    let server = MockServer::start().await;
    let monday = next_monday();

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let service = AvailabilityService::new(&config);

    let result = service
        .get_available_slots(Uuid::new_v4(), Uuid::new_v4(), monday, monday - Duration::days(3), "token")
        .await;

    assert_matches!(result, Err(ScheduleError::ValidationError(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

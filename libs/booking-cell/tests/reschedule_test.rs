// Reschedule eligibility and execution, store mocked.
use chrono::{Datelike, Duration, Utc, Weekday};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use booking_cell::error::BookingError;
use booking_cell::models::{
    Booking, BookingStatus, PaymentMethod, RescheduleRequest,
};
use booking_cell::services::reschedule::RescheduleEngine;
use shared_utils::test_utils::{MockStoreResponses, TestConfig};

fn next_monday() -> chrono::NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }
    date
}

fn confirmed_booking(schedule_id: Uuid) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        branch_id: Uuid::new_v4(),
        schedule_id,
        date: next_monday(),
        slot_number: 1,
        patient_id: Uuid::new_v4(),
        token_number: 1,
        status: BookingStatus::Confirmed,
        payment_method: PaymentMethod::Cash,
        booking_fee: 350.0,
        created_at: Utc::now(),
    }
}

/// Slot grid mocks shared by eligibility checks (which resolve the
/// appointment's start time from the grid).
async fn mount_slot_grid(server: &MockServer, booking: &Booking) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::schedule_definition_row(
                booking.schedule_id, booking.doctor_id, booking.branch_id,
                1, "09:00:00", "12:00:00", 30,
            )
        ])))
        .mount(server)
        .await;
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
async fn fresh_booking_has_one_reschedule_in_the_budget() {
    let server = MockServer::start().await;
    let booking = confirmed_booking(Uuid::new_v4());

    mount_slot_grid(&server, &booking).await;
    // No counter row: the default budget applies
    Mock::given(method("GET"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let engine = RescheduleEngine::new(&config);

    let eligibility = engine.check_eligibility(&booking, "token").await.unwrap();
    assert!(eligibility.can_reschedule);
    assert_eq!(eligibility.remaining_attempts, 1);
    assert_eq!(eligibility.max_attempts, 1);
    assert!(!eligibility.is_admin_cancelled_origin);
}

#[tokio::test]
async fn spent_budget_blocks_a_second_patient_move() {
    let server = MockServer::start().await;
    let booking = confirmed_booking(Uuid::new_v4());

    mount_slot_grid(&server, &booking).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::reschedule_attempt_row(booking.id, 1, 1, false)
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let engine = RescheduleEngine::new(&config);

    let eligibility = engine.check_eligibility(&booking, "token").await.unwrap();
    assert!(!eligibility.can_reschedule);
    assert_eq!(eligibility.remaining_attempts, 0);
    assert!(eligibility.reason.unwrap().contains("limit"));
}

#[tokio::test]
async fn elevated_budget_survives_a_branch_side_move() {
    let server = MockServer::start().await;
    let booking = confirmed_booking(Uuid::new_v4());

    mount_slot_grid(&server, &booking).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::reschedule_attempt_row(booking.id, 0, 2, true)
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let engine = RescheduleEngine::new(&config);

    let eligibility = engine.check_eligibility(&booking, "token").await.unwrap();
    assert!(eligibility.can_reschedule);
    assert_eq!(eligibility.remaining_attempts, 2);
    assert!(eligibility.is_admin_cancelled_origin);
}

#[tokio::test]
async fn unconfirmed_reschedule_is_rejected_without_traffic() {
    let server = MockServer::start().await;
    let booking = confirmed_booking(Uuid::new_v4());

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let engine = RescheduleEngine::new(&config);

    let request = RescheduleRequest {
        new_date: next_monday() + Duration::days(7),
        new_slot_number: 3,
        reason: None,
        confirmed: false,
    };

    let result = engine
        .execute_reschedule(&booking, &request, false, "token")
        .await;

    assert_matches!(result, Err(BookingError::ConfirmationRequired));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn successful_move_cancels_the_original_and_carries_payment() {
    let server = MockServer::start().await;
    let booking = confirmed_booking(Uuid::new_v4());
    let new_date = next_monday() + Duration::days(7);

    mount_slot_grid(&server, &booking).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    // Empty write bodies, the PostgREST default without a Prefer header
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let replacement_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
            MockStoreResponses::booking_row(
                replacement_id, booking.doctor_id, booking.branch_id, booking.schedule_id,
                booking.patient_id, &new_date.to_string(), 3, "confirmed",
            )
        ])))
        .expect(1)
        .mount(&server)
        .await;
    // The original is cancelled, never deleted
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cancellation_records"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let engine = RescheduleEngine::new(&config);

    let request = RescheduleRequest {
        new_date,
        new_slot_number: 3,
        reason: Some("travel".to_string()),
        confirmed: true,
    };

    let replacement = engine
        .execute_reschedule(&booking, &request, false, "token")
        .await
        .unwrap();

    assert_eq!(replacement.id, replacement_id);
    assert_eq!(replacement.status, BookingStatus::Confirmed);
    assert_eq!(replacement.slot_number, 3);
    // Same fee, no new charge
    assert_eq!(replacement.booking_fee, booking.booking_fee);
}

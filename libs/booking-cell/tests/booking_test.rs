// End-to-end booking pipeline against a wiremock store.
use chrono::{Datelike, Duration, Utc, Weekday};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use booking_cell::error::BookingError;
use booking_cell::models::{
    BookingFlowState, BookingStatus, CreateBookingRequest, PaymentMethod,
};
use booking_cell::services::booking::BookingOrchestrator;
use shared_utils::test_utils::{MockStoreResponses, TestConfig};

fn next_monday() -> chrono::NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }
    date
}

struct Ids {
    doctor: Uuid,
    branch: Uuid,
    schedule: Uuid,
    patient: Uuid,
}

impl Ids {
    fn new() -> Self {
        Self {
            doctor: Uuid::new_v4(),
            branch: Uuid::new_v4(),
            schedule: Uuid::new_v4(),
            patient: Uuid::new_v4(),
        }
    }
}

fn cash_request(ids: &Ids, slots: Vec<i32>) -> CreateBookingRequest {
    CreateBookingRequest {
        patient_id: ids.patient,
        doctor_id: ids.doctor,
        branch_id: ids.branch,
        date: next_monday(),
        slot_numbers: slots,
        payment_method: PaymentMethod::Cash,
        flow_state: Some(BookingFlowState::Confirm),
        return_url: None,
        cancel_url: None,
    }
}

/// Mounts the slot grid: one Monday 09:00-12:00 schedule, the given
/// already-booked slot rows, no approved cancellations.
async fn mount_slot_grid(server: &MockServer, ids: &Ids, booked: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_definitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            MockStoreResponses::schedule_definition_row(
                ids.schedule, ids.doctor, ids.branch, 1, "09:00:00", "12:00:00", 30,
            )
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(booked))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_cancellation_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
}

/// Lock writes answer the way PostgREST does without a Prefer header:
/// 201/204 with an empty body.
async fn mount_lock_lifecycle(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

#[tokio::test]
async fn cash_booking_for_three_slots_confirms_immediately() {
    let server = MockServer::start().await;
    let ids = Ids::new();
    let date = next_monday();

    mount_slot_grid(&server, &ids, serde_json::json!([])).await;
    mount_lock_lifecycle(&server).await;

    let created: Vec<serde_json::Value> = [1, 2, 3]
        .iter()
        .map(|slot| {
            MockStoreResponses::booking_row(
                Uuid::new_v4(), ids.doctor, ids.branch, ids.schedule,
                ids.patient, &date.to_string(), *slot, "confirmed",
            )
        })
        .collect();
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(created))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let orchestrator = BookingOrchestrator::new(&config);

    let response = orchestrator
        .create_booking(cash_request(&ids, vec![1, 2, 3]), "token")
        .await
        .unwrap();

    assert_eq!(response.bookings.len(), 3);
    assert_eq!(response.token_numbers, vec![1, 2, 3]);
    assert_eq!(response.total_amount, 1050.0);
    assert!(response.payment.is_none());
    assert!(response
        .bookings
        .iter()
        .all(|b| b.status == BookingStatus::Confirmed));
}

#[tokio::test]
async fn online_booking_is_pending_with_a_signed_redirect() {
    let server = MockServer::start().await;
    let ids = Ids::new();
    let date = next_monday();

    mount_slot_grid(&server, &ids, serde_json::json!([])).await;
    mount_lock_lifecycle(&server).await;

    let first_id = Uuid::new_v4();
    let second_id = Uuid::new_v4();
    let rows: Vec<serde_json::Value> = [(first_id, 1), (second_id, 2)]
        .iter()
        .map(|(id, slot)| {
            let mut row = MockStoreResponses::booking_row(
                *id, ids.doctor, ids.branch, ids.schedule,
                ids.patient, &date.to_string(), *slot, "pending_payment",
            );
            row["payment_method"] = serde_json::json!("online");
            row
        })
        .collect();
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(rows))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reschedule_attempts"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let orchestrator = BookingOrchestrator::new(&config);

    let mut request = cash_request(&ids, vec![1, 2]);
    request.payment_method = PaymentMethod::Online;
    request.return_url = Some("https://app.example/return".to_string());
    request.cancel_url = Some("https://app.example/cancel".to_string());

    let response = orchestrator.create_booking(request, "token").await.unwrap();

    assert!(response
        .bookings
        .iter()
        .all(|b| b.status == BookingStatus::PendingPayment));
    let payment = response.payment.expect("online booking carries a redirect");
    assert_eq!(payment.amount, "700.00");
    assert!(payment.order_id.starts_with("MB-"));
    // The order reference names every row of the group
    assert!(payment.order_id.contains(&first_id.to_string()));
    assert!(payment.order_id.contains(&second_id.to_string()));
    assert!(!payment.signature.is_empty());
}

#[tokio::test]
async fn taken_slot_fails_fast_without_inserting_anything() {
    let server = MockServer::start().await;
    let ids = Ids::new();
    let date = next_monday();

    mount_slot_grid(
        &server,
        &ids,
        serde_json::json!([
            { "schedule_id": ids.schedule, "date": date, "slot_number": 2 }
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let orchestrator = BookingOrchestrator::new(&config);

    let result = orchestrator
        .create_booking(cash_request(&ids, vec![2]), "token")
        .await;

    assert_matches!(result, Err(BookingError::SlotConflict(_)));
}

#[tokio::test]
async fn losing_the_lock_race_is_a_slot_conflict() {
    let server = MockServer::start().await;
    let ids = Ids::new();

    mount_slot_grid(&server, &ids, serde_json::json!([])).await;

    // Someone else holds the lock: unique key insert bounces with 409
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let orchestrator = BookingOrchestrator::new(&config);

    let result = orchestrator
        .create_booking(cash_request(&ids, vec![1]), "token")
        .await;

    assert_matches!(result, Err(BookingError::SlotConflict(_)));
}

#[tokio::test]
async fn slot_cap_and_bad_input_are_rejected_before_any_traffic() {
    let server = MockServer::start().await;
    let ids = Ids::new();

    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    let orchestrator = BookingOrchestrator::new(&config);

    let too_many = orchestrator
        .create_booking(cash_request(&ids, vec![1, 2, 3, 4, 5, 6]), "token")
        .await;
    assert_matches!(
        too_many,
        Err(BookingError::CapacityExceeded { requested: 6, max: 5 })
    );

    let empty = orchestrator
        .create_booking(cash_request(&ids, vec![]), "token")
        .await;
    assert_matches!(empty, Err(BookingError::ValidationError(_)));

    let mut stale = cash_request(&ids, vec![1]);
    stale.flow_state = Some(BookingFlowState::Search);
    let wrong_stage = orchestrator.create_booking(stale, "token").await;
    assert_matches!(wrong_stage, Err(BookingError::InvalidFlowTransition { .. }));

    assert!(server.received_requests().await.unwrap().is_empty());
}

// libs/booking-cell/tests/booking_service_test.rs
//
// Service-level tests against a mocked PostgREST endpoint. The pure
// transition table is covered by unit tests next to the machine; these
// exercise the persistence and slot-claim plumbing around it.

use chrono::NaiveDate;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use booking_cell::models::{BookingError, BookingStatus, CreateBookingRequest};
use booking_cell::services::assignment::AssignmentService;
use booking_cell::services::booking::BookingService;
use booking_cell::services::expiry::ExpirySweepService;
use shared_utils::test_utils::{TestConfig, TestUser};

fn booking_json(
    id: Uuid,
    customer_id: Uuid,
    business_id: Uuid,
    status: &str,
    payment_status: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "customer_id": customer_id,
        "therapist_id": null,
        "service_id": Uuid::new_v4(),
        "business_id": business_id,
        "date": "2025-03-01",
        "time": "10:00:00",
        "status": status,
        "assigned_by_admin": false,
        "response_visible_to_business_only": false,
        "therapist_responded": false,
        "payment_status": payment_status,
        "created_at": "2025-02-20T10:00:00Z",
        "updated_at": "2025-02-20T10:00:00Z"
    })
}

fn service_json(service_id: Uuid, business_id: Uuid, therapist_id: Uuid) -> serde_json::Value {
    serde_json::json!({
        "id": service_id,
        "business_id": business_id,
        "price": 100.0,
        "duration_minutes": 60,
        "therapist_ids": [therapist_id]
    })
}

fn slot_json(therapist_id: Uuid, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4(),
        "therapist_id": therapist_id,
        "date": "2025-03-01",
        "start_time": "10:00:00",
        "end_time": "11:00:00",
        "status": status,
        "created_at": "2025-02-20T10:00:00Z"
    })
}

async fn mount_notification_sink(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn direct_booking_claims_the_slot_and_creates_a_pending_booking() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let therapist_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    let business_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![service_json(
            service_id,
            business_id,
            therapist_id,
        )]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![slot_json(therapist_id, "booked")]),
        )
        .mount(&mock_server)
        .await;

    let created = {
        let mut body = booking_json(
            Uuid::new_v4(),
            customer.id,
            business_id,
            "pending",
            "pending",
        );
        body["therapist_id"] = serde_json::json!(therapist_id);
        body["service_id"] = serde_json::json!(service_id);
        body
    };
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![created]))
        .mount(&mock_server)
        .await;

    mount_notification_sink(&mock_server).await;

    let request = CreateBookingRequest {
        therapist_id,
        service_id,
        date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    };

    let booking = service
        .create_direct_booking(customer.id, request, "test_token")
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(!booking.assigned_by_admin);
    assert_eq!(booking.customer_id, customer.id);
}

#[tokio::test]
async fn direct_booking_conflicts_when_the_slot_claim_loses() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let therapist_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![service_json(
            service_id,
            Uuid::new_v4(),
            therapist_id,
        )]))
        .mount(&mock_server)
        .await;

    // The conditional update matched no Available row: somebody else won.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let request = CreateBookingRequest {
        therapist_id,
        service_id,
        date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    };

    let result = service
        .create_direct_booking(Uuid::new_v4(), request, "test_token")
        .await;

    assert_matches!(result, Err(BookingError::SlotUnavailable));
}

#[tokio::test]
async fn assignment_requires_an_approved_association() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = AssignmentService::new(&config);

    let business = TestUser::business("b@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            Uuid::new_v4(),
            business.id,
            "pending",
            "pending",
        )]))
        .mount(&mock_server)
        .await;

    // No approved association row for this therapist/business pair.
    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_business_associations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let result = service
        .assign_booking_to_therapist(business.id, booking_id, Uuid::new_v4(), "test_token")
        .await;

    assert_matches!(result, Err(BookingError::TherapistNotApproved));
}

#[tokio::test]
async fn assignment_rejects_a_booking_owned_by_another_business() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = AssignmentService::new(&config);

    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "pending",
            "pending",
        )]))
        .mount(&mock_server)
        .await;

    let result = service
        .assign_booking_to_therapist(Uuid::new_v4(), booking_id, Uuid::new_v4(), "test_token")
        .await;

    assert_matches!(result, Err(BookingError::Forbidden));
}

#[tokio::test]
async fn assignment_conflicts_on_a_terminal_booking() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = AssignmentService::new(&config);

    let business = TestUser::business("b@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            Uuid::new_v4(),
            business.id,
            "cancelled",
            "pending",
        )]))
        .mount(&mock_server)
        .await;

    let result = service
        .assign_booking_to_therapist(business.id, booking_id, Uuid::new_v4(), "test_token")
        .await;

    assert_matches!(result, Err(BookingError::NotReassignable));
}

#[tokio::test]
async fn customer_read_never_sees_an_unrelayed_therapist_response() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let booking_id = Uuid::new_v4();

    // Therapist confirmed, business has not relayed yet.
    let mut hidden = booking_json(
        booking_id,
        customer.id,
        Uuid::new_v4(),
        "confirmed",
        "pending",
    );
    hidden["therapist_id"] = serde_json::json!(Uuid::new_v4());
    hidden["assigned_by_admin"] = serde_json::json!(true);
    hidden["therapist_responded"] = serde_json::json!(true);
    hidden["response_visible_to_business_only"] = serde_json::json!(true);

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![hidden]))
        .mount(&mock_server)
        .await;

    let view = service
        .get_booking_for(&customer.to_auth_user(), booking_id, "test_token")
        .await
        .unwrap();

    assert_eq!(view["status"], "pending");
}

#[tokio::test]
async fn expiry_sweep_cancels_unpaid_past_bookings() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = ExpirySweepService::new(&config);

    let stale = booking_json(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "pending",
        "pending",
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![stale.clone()]))
        .mount(&mock_server)
        .await;

    let mut cancelled = stale;
    cancelled["status"] = serde_json::json!("cancelled");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![cancelled]))
        .mount(&mock_server)
        .await;

    let expired = service.expire_unpaid("test_token").await.unwrap();

    assert_eq!(expired, 1);
}

#[tokio::test]
async fn expiry_sweep_skips_bookings_whose_payment_landed_mid_sweep() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = ExpirySweepService::new(&config);

    // The row came back from the query already paid: the machine refuses it
    // and the sweep moves on without writing.
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "pending",
            "completed",
        )]))
        .mount(&mock_server)
        .await;

    let expired = service.expire_unpaid("test_token").await.unwrap();

    assert_eq!(expired, 0);
}

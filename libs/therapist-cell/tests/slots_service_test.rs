use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use shared_utils::test_utils::TestConfig;
use therapist_cell::models::{CreateSlotRequest, SlotStatus, TherapistError};
use therapist_cell::services::slots::SlotService;

struct TestSetup {
    service: SlotService,
    mock_server: MockServer,
    auth_token: String,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
        let service = SlotService::new(&config);

        Self {
            service,
            mock_server,
            auth_token: "test_token".to_string(),
        }
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn slot_json(therapist_id: Uuid, start: &str, end: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4(),
        "therapist_id": therapist_id,
        "date": "2025-03-01",
        "start_time": start,
        "end_time": end,
        "status": status,
        "created_at": "2025-02-20T10:00:00Z"
    })
}

#[tokio::test]
async fn claim_slot_returns_the_booked_row_when_it_wins() {
    let setup = TestSetup::new().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            therapist_id,
            "10:00:00",
            "11:00:00",
            "booked",
        )]))
        .mount(&setup.mock_server)
        .await;

    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let claimed = setup
        .service
        .claim_slot(therapist_id, date, t(10, 0), t(11, 0), &setup.auth_token)
        .await
        .unwrap();

    let slot = claimed.expect("claim should win");
    assert_eq!(slot.status, SlotStatus::Booked);
    assert_eq!(slot.start_time, t(10, 0));
}

#[tokio::test]
async fn claim_slot_reports_none_when_the_conditional_update_matches_nothing() {
    let setup = TestSetup::new().await;

    // Another request already flipped the slot: PostgREST matches zero rows.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let claimed = setup
        .service
        .claim_slot(Uuid::new_v4(), date, t(10, 0), t(11, 0), &setup.auth_token)
        .await
        .unwrap();

    assert!(claimed.is_none());
}

#[tokio::test]
async fn create_slot_rejects_an_overlapping_window() {
    let setup = TestSetup::new().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            therapist_id,
            "10:00:00",
            "11:00:00",
            "available",
        )]))
        .mount(&setup.mock_server)
        .await;

    let request = CreateSlotRequest {
        date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        start_time: t(10, 30),
        end_time: t(11, 30),
    };

    let result = setup
        .service
        .create_slot(therapist_id, request, &setup.auth_token)
        .await;

    assert_matches!(result, Err(TherapistError::SlotOverlap));
}

#[tokio::test]
async fn create_slot_accepts_an_adjacent_window() {
    let setup = TestSetup::new().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            therapist_id,
            "10:00:00",
            "11:00:00",
            "available",
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/therapist_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![slot_json(
            therapist_id,
            "11:00:00",
            "12:00:00",
            "available",
        )]))
        .mount(&setup.mock_server)
        .await;

    let request = CreateSlotRequest {
        date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        start_time: t(11, 0),
        end_time: t(12, 0),
    };

    let slot = setup
        .service
        .create_slot(therapist_id, request, &setup.auth_token)
        .await
        .unwrap();

    assert_eq!(slot.status, SlotStatus::Available);
    assert_eq!(slot.start_time, t(11, 0));
}

#[tokio::test]
async fn create_slot_rejects_an_inverted_window() {
    let setup = TestSetup::new().await;

    let request = CreateSlotRequest {
        date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        start_time: t(12, 0),
        end_time: t(11, 0),
    };

    let result = setup
        .service
        .create_slot(Uuid::new_v4(), request, &setup.auth_token)
        .await;

    assert_matches!(result, Err(TherapistError::ValidationError(_)));
}

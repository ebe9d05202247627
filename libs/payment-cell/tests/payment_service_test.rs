// libs/payment-cell/tests/payment_service_test.rs
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;

use payment_cell::models::{CreateOrderRequest, PaymentError, VerifyPaymentRequest};
use payment_cell::services::payment::PaymentService;
use shared_utils::test_utils::{TestConfig, TestUser};

// Matches the key secret TestConfig hands to the gateway client.
const TEST_KEY_SECRET: &str = "test-key-secret";

fn sign(order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_KEY_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn booking_json(booking_id: Uuid, customer_id: Uuid, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": booking_id,
        "customer_id": customer_id,
        "therapist_id": Uuid::new_v4(),
        "service_id": Uuid::new_v4(),
        "business_id": Uuid::new_v4(),
        "date": "2025-03-01",
        "time": "10:00:00",
        "status": status,
        "assigned_by_admin": false,
        "response_visible_to_business_only": false,
        "therapist_responded": false,
        "payment_status": "pending",
        "created_at": "2025-02-20T10:00:00Z",
        "updated_at": "2025-02-20T10:00:00Z"
    })
}

#[tokio::test]
async fn payment_with_a_bad_signature_is_rejected_before_any_write() {
    let supabase = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&supabase.uri()).to_app_config();
    let service = PaymentService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let request = VerifyPaymentRequest {
        booking_id: Uuid::new_v4(),
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature: "definitely-not-valid".to_string(),
        advance_amount: 100.0,
        remaining_amount: 0.0,
    };

    let result = service
        .record_payment_success(&customer.to_auth_user(), request, "test_token")
        .await;

    assert_matches!(result, Err(PaymentError::SignatureMismatch));
    // No booking lookup, no transition, no payment row update happened.
    assert!(supabase.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn verified_payment_confirms_the_booking() {
    let supabase = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&supabase.uri()).to_app_config();
    let service = PaymentService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            customer.id,
            "pending",
        )]))
        .mount(&supabase)
        .await;

    let mut confirmed = booking_json(booking_id, customer.id, "confirmed");
    confirmed["payment_status"] = serde_json::json!("completed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![confirmed]))
        .mount(&supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&supabase)
        .await;

    let request = VerifyPaymentRequest {
        booking_id,
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature: sign("order_1", "pay_1"),
        advance_amount: 100.0,
        remaining_amount: 0.0,
    };

    let booking = service
        .record_payment_success(&customer.to_auth_user(), request, "test_token")
        .await
        .unwrap();

    assert_eq!(booking.id, booking_id);
    assert_eq!(
        booking.status,
        booking_cell::models::BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn another_customers_booking_cannot_be_paid() {
    let supabase = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&supabase.uri()).to_app_config();
    let service = PaymentService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            Uuid::new_v4(),
            "pending",
        )]))
        .mount(&supabase)
        .await;

    let request = VerifyPaymentRequest {
        booking_id,
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature: sign("order_1", "pay_1"),
        advance_amount: 100.0,
        remaining_amount: 0.0,
    };

    let result = service
        .record_payment_success(&customer.to_auth_user(), request, "test_token")
        .await;

    assert_matches!(result, Err(PaymentError::Forbidden));
}

#[tokio::test]
async fn gateway_failure_surfaces_as_an_upstream_error() {
    let supabase = MockServer::start().await;
    let gateway = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&supabase.uri())
        .with_gateway_url(&gateway.uri())
        .to_app_config();
    let service = PaymentService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            customer.id,
            "pending",
        )]))
        .mount(&supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&gateway)
        .await;

    let request = CreateOrderRequest {
        booking_id,
        amount: 100.0,
    };

    let result = service
        .create_order(&customer.to_auth_user(), request, "test_token")
        .await;

    assert_matches!(result, Err(PaymentError::Gateway(_)));
}

#[tokio::test]
async fn order_creation_records_the_attempt() {
    let supabase = MockServer::start().await;
    let gateway = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&supabase.uri())
        .with_gateway_url(&gateway.uri())
        .to_app_config();
    let service = PaymentService::new(&config);

    let customer = TestUser::customer("c@example.com");
    let booking_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![booking_json(
            booking_id,
            customer.id,
            "pending",
        )]))
        .mount(&supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "order_1",
            "amount": 10000,
            "currency": "USD",
            "receipt": "CAL-0000",
            "status": "created"
        })))
        .mount(&gateway)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![serde_json::json!({
            "id": Uuid::new_v4(),
            "booking_id": booking_id,
            "order_id": "order_1",
            "amount": 100.0,
            "status": "created",
            "created_at": "2025-02-20T10:00:00Z"
        })]))
        .mount(&supabase)
        .await;

    let request = CreateOrderRequest {
        booking_id,
        amount: 100.0,
    };

    let (order, record) = service
        .create_order(&customer.to_auth_user(), request, "test_token")
        .await
        .unwrap();

    assert_eq!(order.id, "order_1");
    assert_eq!(record.order_id, "order_1");
    assert_eq!(record.booking_id, booking_id);
}

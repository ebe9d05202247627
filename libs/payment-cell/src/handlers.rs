use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role};
use shared_models::error::AppError;

use booking_cell::models::{BookingError, TransitionError};

use crate::models::{CreateOrderRequest, PaymentError, VerifyPaymentRequest};
use crate::services::payment::PaymentService;

fn map_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::BookingNotFound => AppError::NotFound("Booking not found".to_string()),
        PaymentError::SignatureMismatch => {
            AppError::Validation("Payment signature verification failed".to_string())
        }
        PaymentError::Forbidden => {
            AppError::Forbidden("Not authorized to pay for this booking".to_string())
        }
        PaymentError::Gateway(msg) => AppError::Upstream(msg),
        PaymentError::Booking(BookingError::Transition(TransitionError::NotAllowed(msg))) => {
            AppError::Forbidden(msg)
        }
        PaymentError::Booking(BookingError::Transition(e)) => {
            AppError::InvalidTransition(e.to_string())
        }
        PaymentError::Booking(BookingError::ConcurrentModification) => {
            AppError::Conflict("Booking was modified concurrently".to_string())
        }
        PaymentError::Booking(BookingError::NotReassignable) => {
            AppError::Conflict("Booking is in a terminal state".to_string())
        }
        PaymentError::Booking(e) => AppError::Database(e.to_string()),
        PaymentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_customer(user: &AuthUser) -> Result<(), AppError> {
    if user.role != Role::Customer {
        return Err(AppError::Forbidden(
            "Only a customer may pay for a booking".to_string(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn create_order(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<Value>, AppError> {
    require_customer(&user)?;

    let service = PaymentService::new(&state);

    let (order, record) = service
        .create_order(&user, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "order": order,
        "payment": record
    })))
}

#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    require_customer(&user)?;

    let service = PaymentService::new(&state);

    let booking = service
        .record_payment_success(&user, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Payment recorded"
    })))
}

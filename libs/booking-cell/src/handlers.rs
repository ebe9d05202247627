// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role};
use shared_models::error::AppError;

use crate::models::{
    AssignBookingRequest, BookingError, BookingListQuery, CreateBookingRequest,
    CustomerBookingView, RelayAction, RelayRequest, RescheduleBookingRequest,
    TherapistResponseRequest, TransitionError,
};
use crate::services::assignment::AssignmentService;
use crate::services::booking::BookingService;
use crate::services::expiry::ExpirySweepService;

fn map_error(e: BookingError) -> AppError {
    match e {
        BookingError::NotFound => AppError::NotFound("Booking not found".to_string()),
        BookingError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        BookingError::SlotUnavailable => {
            AppError::Conflict("Requested slot is unavailable".to_string())
        }
        BookingError::TherapistNotApproved => {
            AppError::Forbidden("Therapist is not approved for this business".to_string())
        }
        BookingError::Forbidden => {
            AppError::Forbidden("Not authorized to act on this booking".to_string())
        }
        BookingError::NotReassignable => {
            AppError::Conflict("Booking is in a terminal state".to_string())
        }
        BookingError::ConcurrentModification => {
            AppError::Conflict("Booking was modified concurrently".to_string())
        }
        BookingError::Transition(TransitionError::NotAllowed(msg)) => AppError::Forbidden(msg),
        BookingError::Transition(e) => AppError::InvalidTransition(e.to_string()),
        BookingError::ValidationError(msg) => AppError::Validation(msg),
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_role(user: &AuthUser, role: Role, action: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden(format!("Only a {} may {}", role, action)));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Customer, "create a booking")?;

    let service = BookingService::new(&state);

    let booking = service
        .create_direct_booking(user.id, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": CustomerBookingView::from_booking(&booking),
        "message": "Booking created successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let view = service
        .get_booking_for(&user, booking_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn list_bookings(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<BookingListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let bookings = service
        .list_for(&user, &query, auth.token())
        .await
        .map_err(map_error)?;

    let payload = if user.role == Role::Customer {
        let views: Vec<CustomerBookingView> =
            bookings.iter().map(CustomerBookingView::from_booking).collect();
        json!({ "bookings": views })
    } else {
        json!({ "bookings": bookings })
    };

    Ok(Json(payload))
}

#[axum::debug_handler]
pub async fn assign_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AssignBookingRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Business, "assign a booking")?;

    let service = AssignmentService::new(&state);

    let booking = service
        .assign_booking_to_therapist(user.id, booking_id, request.therapist_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Booking assigned to therapist"
    })))
}

#[axum::debug_handler]
pub async fn respond_to_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<TherapistResponseRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Therapist, "respond to a booking")?;

    let service = BookingService::new(&state);

    let booking = service
        .respond(&user, booking_id, request.action, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Response recorded for business review"
    })))
}

#[axum::debug_handler]
pub async fn relay_booking_response(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RelayRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Business, "review a therapist response")?;

    let service = BookingService::new(&state);

    let booking = match request.action {
        RelayAction::Approve => service.relay(&user, booking_id, auth.token()).await,
        RelayAction::RevertToPending => {
            service.revert_to_pending(&user, booking_id, auth.token()).await
        }
    }
    .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking
    })))
}

#[axum::debug_handler]
pub async fn reschedule_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RescheduleBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let booking = service
        .reschedule(&user, booking_id, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Booking rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let booking = service
        .cancel(&user, booking_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Booking cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_booking(
    State(state): State<Arc<AppConfig>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Therapist, "complete a booking")?;

    let service = BookingService::new(&state);

    let booking = service
        .complete(&user, booking_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Session completed and payout recorded"
    })))
}

/// Cron-facing sweep. Safe to trigger from any authenticated caller: it only
/// ever cancels unpaid bookings whose date has already passed.
#[axum::debug_handler]
pub async fn expire_unpaid_bookings(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = ExpirySweepService::new(&state);

    let expired = service
        .expire_unpaid(auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "expired": expired
    })))
}

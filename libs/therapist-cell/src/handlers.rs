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
    BookableSlotsQuery, CreateSlotRequest, ReplaceAvailabilityRequest, SlotListQuery,
    TherapistError,
};
use crate::services::availability::AvailabilityService;
use crate::services::slots::SlotService;

fn map_error(e: TherapistError) -> AppError {
    match e {
        TherapistError::NotFound => AppError::NotFound("Therapist not found".to_string()),
        TherapistError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        TherapistError::BusinessNotFound => AppError::NotFound("Business not found".to_string()),
        TherapistError::SlotOverlap => {
            AppError::Conflict("Slot overlaps an existing slot".to_string())
        }
        TherapistError::ValidationError(msg) => AppError::Validation(msg),
        TherapistError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_own_therapist(user: &AuthUser, therapist_id: Uuid) -> Result<(), AppError> {
    if user.role != Role::Therapist || user.id != therapist_id {
        return Err(AppError::Forbidden(
            "Only the therapist can manage their schedule".to_string(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    Path(therapist_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let rules = service
        .get_rules(therapist_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "availability": rules })))
}

#[axum::debug_handler]
pub async fn replace_availability(
    State(state): State<Arc<AppConfig>>,
    Path(therapist_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_own_therapist(&user, therapist_id)?;

    let service = AvailabilityService::new(&state);

    let rules = service
        .replace_rules(therapist_id, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "availability": rules
    })))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    Path(therapist_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    require_own_therapist(&user, therapist_id)?;

    let service = SlotService::new(&state);

    let slot = service
        .create_slot(therapist_id, request, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot
    })))
}

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AppConfig>>,
    Path(therapist_id): Path<Uuid>,
    Query(query): Query<SlotListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = SlotService::new(&state);

    let slots = service
        .list_slots(therapist_id, query.date, query.status, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({ "slots": slots })))
}

#[axum::debug_handler]
pub async fn bookable_slots(
    State(state): State<Arc<AppConfig>>,
    Path(therapist_id): Path<Uuid>,
    Query(query): Query<BookableSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slots = service
        .bookable_slots(therapist_id, query.service_id, query.date, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "date": query.date,
        "slots": slots
    })))
}

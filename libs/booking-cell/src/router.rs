// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    // All booking operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/", get(handlers::list_bookings))
        .route("/expire-unpaid", post(handlers::expire_unpaid_bookings))
        .route("/{booking_id}", get(handlers::get_booking))
        .route("/{booking_id}/assign", post(handlers::assign_booking))
        .route("/{booking_id}/respond", post(handlers::respond_to_booking))
        .route("/{booking_id}/relay", post(handlers::relay_booking_response))
        .route("/{booking_id}/reschedule", patch(handlers::reschedule_booking))
        .route("/{booking_id}/cancel", post(handlers::cancel_booking))
        .route("/{booking_id}/complete", post(handlers::complete_booking))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

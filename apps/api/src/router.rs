use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};

use booking_cell::router::booking_routes;
use notification_cell::router::notification_routes;
use payment_cell::router::payment_routes;
use shared_config::AppConfig;
use therapist_cell::router::therapist_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Calmora marketplace API is running!" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/bookings", booking_routes(state.clone()))
        .nest("/api/therapists", therapist_routes(state.clone()))
        .nest("/api/payments", payment_routes(state.clone()))
        .nest("/api/notifications", notification_routes(state.clone()))
}

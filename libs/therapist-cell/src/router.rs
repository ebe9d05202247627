use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn therapist_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{therapist_id}/availability", get(handlers::get_availability))
        .route("/{therapist_id}/availability", put(handlers::replace_availability))
        .route("/{therapist_id}/slots", post(handlers::create_slot))
        .route("/{therapist_id}/slots", get(handlers::list_slots))
        .route("/{therapist_id}/bookable-slots", get(handlers::bookable_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

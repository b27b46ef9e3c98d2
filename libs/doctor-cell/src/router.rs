use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/eligible", get(handlers::list_eligible_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/", get(handlers::list_all_doctors))
        .route("/", post(handlers::register_doctor))
        .route("/availability", patch(handlers::set_availability))
        .route("/{doctor_id}/verify", patch(handlers::verify_doctor))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

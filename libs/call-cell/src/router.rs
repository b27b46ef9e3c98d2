use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn call_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_call))
        .route("/{session_id}/start", patch(handlers::start_call))
        .route("/{session_id}/end", patch(handlers::end_call))
        .route(
            "/appointment/{appointment_id}",
            get(handlers::get_call_for_appointment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

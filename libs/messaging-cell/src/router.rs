use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn message_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::send_message))
        .route("/{appointment_id}", get(handlers::list_thread))
        .route("/{message_id}/read", patch(handlers::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

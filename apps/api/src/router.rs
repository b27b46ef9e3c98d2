use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use call_cell::router::call_routes;
use doctor_cell::router::doctor_routes;
use messaging_cell::router::message_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Teleclinic API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/calls", call_routes(state.clone()))
        .nest("/messages", message_routes(state))
}

//! Contains all the routes that this application can handle.

mod api;
mod home;

// re-export errors
pub use api::subscribe::SubscribeError;

use crate::{web::Error, AppState};
use home::home;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Answers every method a route doesn't handle.
async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// All the routes of the server
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .with_state(app_state.clone())
        .nest("/api", api_routes(app_state))
        .nest_service("/static", ServeDir::new("static"))
        .route("/health-check", get(health_check))
}

/// API - Routes nested under "/api" path
fn api_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/subscribe",
            post(api::subscribe).fallback(method_not_allowed),
        )
        .with_state(app_state)
}

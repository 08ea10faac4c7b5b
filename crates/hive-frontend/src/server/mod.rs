//! Client-facing HTTP and websocket server.

pub mod actions;
pub mod error;
pub mod extract;
mod http;
pub mod state;
mod ws;

use axum::Router;
use axum::routing::get;

pub use error::ApiError;
pub use state::{AppState, ServerSettings};

/// Build the router with every client route.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/api/websocket", get(ws::upgrade))
        .route(
            "/device/{guid}/command",
            get(http::list_commands).post(http::insert_command),
        )
        .route(
            "/device/{guid}/command/{id}",
            get(http::get_command).put(http::update_command),
        )
        .route("/device/{guid}/command/{id}/poll", get(http::poll_command))
        .route(
            "/device/{guid}/notification",
            get(http::list_notifications).post(http::insert_notification),
        )
        .route(
            "/device/{guid}/notification/{id}",
            get(http::get_notification),
        )
        .with_state(state)
}

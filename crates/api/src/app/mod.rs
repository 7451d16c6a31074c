//! HTTP API application wiring (Axum router).
//!
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request validation and response bodies
//! - `errors.rs`: consistent JSON status/error bodies

use axum::{http::StatusCode, routing::get, Router};
use tower::ServiceBuilder;

use crate::context::AppState;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    // Protected routes: require a known API key.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::api_key_middleware,
    ));

    Router::new()
        .route("/ready", get(routes::system::ready))
        .route("/live", get(routes::system::live))
        .nest("/api", protected)
        .fallback(|| async { errors::status_response(StatusCode::NOT_FOUND) })
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::log_requests)))
        .with_state(state)
}

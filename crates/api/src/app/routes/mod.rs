use axum::Router;

use crate::context::AppState;

pub mod assets;
pub mod jobs;
pub mod system;
pub mod transactions;

/// Router for all API-key authenticated endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/assets", assets::router())
        .nest("/jobs", jobs::router())
        .nest("/transactions", transactions::router())
}

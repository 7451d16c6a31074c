use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{debug, error};

use ledgerq_jobs::JobError;

use crate::app::errors;
use crate::context::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:job_id", get(get_job))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    debug!(job_id = %job_id, "read job request received");

    match state.queue.get_job_summary_by_str(&job_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(JobError::NotFound(_)) => errors::status_response(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "error processing read job request");
            errors::internal_error()
        }
    }
}

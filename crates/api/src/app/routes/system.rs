use axum::{extract::State, http::StatusCode, response::Response};
use tracing::error;

use crate::app::errors;
use crate::context::AppState;

pub async fn ready() -> Response {
    errors::status_response(StatusCode::OK)
}

/// Live when every organisation's ledger answers and the queue is reachable.
pub async fn live(State(state): State<AppState>) -> Response {
    let org1 = &state.config.org1.msp_id;
    let org2 = &state.config.org2.msp_id;

    let check = async {
        let (Some(gw1), Some(gw2)) = (state.gateways.get(org1), state.gateways.get(org2)) else {
            return Err("missing gateway".to_string());
        };
        tokio::try_join!(
            async { gw1.block_height().await.map_err(|e| e.to_string()) },
            async { gw2.block_height().await.map_err(|e| e.to_string()) },
            async { state.queue.get_job_counts().await.map_err(|e| e.to_string()) },
        )
        .map(|_| ())
    };

    match check.await {
        Ok(()) => errors::status_response(StatusCode::OK),
        Err(e) => {
            error!(error = %e, "liveness check failed");
            errors::status_response(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

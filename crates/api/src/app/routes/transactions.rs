use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{debug, error};

use ledgerq_core::TransactionId;
use ledgerq_ledger::LedgerError;

use crate::app::{dto, errors};
use crate::context::{AppState, OrgContext};

pub fn router() -> Router<AppState> {
    Router::new().route("/:transaction_id", get(get_transaction))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(transaction_id): Path<String>,
) -> Response {
    debug!(transaction_id = %transaction_id, "read transaction request received");
    let Some(gateway) = state.gateways.get(org.org_id()) else {
        error!(org = %org.org_id(), "no gateway for organisation");
        return errors::internal_error();
    };

    let id = TransactionId::new(transaction_id.clone());
    match gateway.transaction_validation_code(&id).await {
        Ok(validation_code) => (
            StatusCode::OK,
            Json(dto::TransactionResponse {
                transaction_id,
                validation_code,
            }),
        )
            .into_response(),
        Err(LedgerError::TransactionNotFound { .. }) => errors::status_response(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(transaction_id = %transaction_id, error = %e, "error processing read transaction request");
            errors::internal_error()
        }
    }
}

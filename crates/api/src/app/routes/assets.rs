use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{debug, error};

use ledgerq_ledger::{Gateway, LedgerError};

use crate::app::{dto, errors};
use crate::context::{AppState, Ledger, OrgContext};

pub const ALLOWED_METHODS: &str = "DELETE,GET,OPTIONS,PATCH,PUT";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assets).post(create_asset))
        .route(
            "/:asset_id",
            get(read_asset)
                .put(update_asset)
                .patch(transfer_asset)
                .delete(delete_asset)
                .options(asset_options),
        )
}

fn gateway<'a>(state: &'a AppState, org: &OrgContext) -> Result<&'a Gateway<Ledger>, Response> {
    state.gateways.get(org.org_id()).ok_or_else(|| {
        error!(org = %org.org_id(), "no gateway for organisation");
        errors::internal_error()
    })
}

async fn enqueue(
    state: &AppState,
    org: &OrgContext,
    transaction_name: &str,
    asset_id: &str,
    args: Vec<String>,
) -> Response {
    match state
        .queue
        .enqueue_submission(org.org_id().clone(), transaction_name, asset_id, args)
        .await
    {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(dto::AcceptedResponse {
                status: "Accepted",
                job_id,
                timestamp: errors::timestamp(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(asset_id, transaction = transaction_name, error = %e, "error queueing submit job");
            errors::internal_error()
        }
    }
}

pub async fn list_assets(State(state): State<AppState>, Extension(org): Extension<OrgContext>) -> Response {
    debug!("get all assets request received");
    let gateway = match gateway(&state, &org) {
        Ok(gateway) => gateway,
        Err(response) => return response,
    };

    let data = match gateway.evaluate_transaction("GetAllAssets", &[]).await {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "error processing get all assets request");
            return errors::internal_error();
        }
    };

    if data.is_empty() {
        return (StatusCode::OK, Json(Value::Array(Vec::new()))).into_response();
    }
    match serde_json::from_slice::<Value>(&data) {
        Ok(assets) => (StatusCode::OK, Json(assets)).into_response(),
        Err(e) => {
            error!(error = %e, "invalid get all assets payload");
            errors::internal_error()
        }
    }
}

pub async fn create_asset(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    body: Bytes,
) -> Response {
    debug!("create asset request received");
    let asset = match dto::parse_asset(&body) {
        Ok(asset) => asset,
        Err(field_errors) => return errors::validation_error(field_errors),
    };

    enqueue(&state, &org, "CreateAsset", &asset.id, asset.field_args()).await
}

pub async fn asset_options(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(asset_id): Path<String>,
) -> Response {
    debug!(asset_id = %asset_id, "asset options request received");
    let gateway = match gateway(&state, &org) {
        Ok(gateway) => gateway,
        Err(response) => return response,
    };

    match gateway.evaluate_transaction("AssetExists", &[asset_id.clone()]).await {
        Ok(data) if data == b"true" => {
            let mut response = errors::status_response(StatusCode::OK);
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static(ALLOWED_METHODS));
            response
        }
        Ok(_) => errors::status_response(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(asset_id = %asset_id, error = %e, "error processing asset options request");
            errors::internal_error()
        }
    }
}

pub async fn read_asset(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(asset_id): Path<String>,
) -> Response {
    debug!(asset_id = %asset_id, "read asset request received");
    let gateway = match gateway(&state, &org) {
        Ok(gateway) => gateway,
        Err(response) => return response,
    };

    let data = match gateway.evaluate_transaction("ReadAsset", &[asset_id.clone()]).await {
        Ok(data) => data,
        Err(LedgerError::AssetNotFound { .. }) => return errors::status_response(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(asset_id = %asset_id, error = %e, "error processing read asset request");
            return errors::internal_error();
        }
    };

    match serde_json::from_slice::<Value>(&data) {
        Ok(asset) => (StatusCode::OK, Json(asset)).into_response(),
        Err(e) => {
            error!(asset_id = %asset_id, error = %e, "invalid read asset payload");
            errors::internal_error()
        }
    }
}

pub async fn update_asset(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(asset_id): Path<String>,
    body: Bytes,
) -> Response {
    debug!(asset_id = %asset_id, "update asset request received");
    let asset = match dto::parse_asset(&body) {
        Ok(asset) => asset,
        Err(field_errors) => return errors::validation_error(field_errors),
    };
    if asset.id != asset_id {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            errors::ASSET_ID_MISMATCH,
            Some("Asset IDs must match"),
        );
    }

    enqueue(&state, &org, "UpdateAsset", &asset_id, asset.field_args()).await
}

pub async fn transfer_asset(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(asset_id): Path<String>,
    body: Bytes,
) -> Response {
    debug!(asset_id = %asset_id, "transfer asset request received");
    let new_owner = match dto::parse_owner_patch(&body) {
        Ok(owner) => owner,
        Err(field_errors) => return errors::validation_error(field_errors),
    };

    enqueue(&state, &org, "TransferAsset", &asset_id, vec![new_owner]).await
}

pub async fn delete_asset(
    State(state): State<AppState>,
    Extension(org): Extension<OrgContext>,
    Path(asset_id): Path<String>,
) -> Response {
    debug!(asset_id = %asset_id, "delete asset request received");
    enqueue(&state, &org, "DeleteAsset", &asset_id, Vec::new()).await
}

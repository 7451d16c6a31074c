use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};

use crate::app::errors;
use crate::context::{AppState, OrgContext};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolve `X-API-Key` to an organisation, or answer 401.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let org = extract_api_key(req.headers()).and_then(|key| state.config.org_for_api_key(key));

    let Some(org) = org else {
        debug!("no valid X-API-Key");
        return errors::json_error(StatusCode::UNAUTHORIZED, errors::NO_VALID_APIKEY, None);
    };

    debug!(org = %org, "authenticated request");
    req.extensions_mut().insert(OrgContext::new(org.clone()));
    next.run(req).await
}

fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let key = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    (!key.is_empty()).then_some(key)
}

/// Log each request at a level matching its response status.
pub async fn log_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = std::time::Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(%method, %uri, status = status.as_u16(), elapsed_ms, "request failed");
    } else if status.is_client_error() {
        warn!(%method, %uri, status = status.as_u16(), elapsed_ms, "request rejected");
    } else {
        debug!(%method, %uri, status = status.as_u16(), elapsed_ms, "request completed");
    }
    response
}

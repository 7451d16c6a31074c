use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::app::dto::FieldError;

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const ASSET_ID_MISMATCH: &str = "ASSET_ID_MISMATCH";
pub const NO_VALID_APIKEY: &str = "NO_VALID_APIKEY";

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn body(status: StatusCode) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "status".into(),
        Value::from(status.canonical_reason().unwrap_or_default()),
    );
    body.insert("timestamp".into(), Value::from(timestamp()));
    body
}

/// `{status, timestamp}` with the status reason phrase.
pub fn status_response(status: StatusCode) -> Response {
    (status, axum::Json(Value::Object(body(status)))).into_response()
}

pub fn json_error(status: StatusCode, reason: &'static str, message: Option<&str>) -> Response {
    let mut body = body(status);
    body.insert("reason".into(), Value::from(reason));
    if let Some(message) = message {
        body.insert("message".into(), Value::from(message));
    }
    (status, axum::Json(Value::Object(body))).into_response()
}

pub fn validation_error(errors: Vec<FieldError>) -> Response {
    let mut body = body(StatusCode::BAD_REQUEST);
    body.insert("reason".into(), Value::from(VALIDATION_ERROR));
    body.insert("message".into(), Value::from("Invalid request body"));
    body.insert("errors".into(), json!(errors));
    (StatusCode::BAD_REQUEST, axum::Json(Value::Object(body))).into_response()
}

pub fn internal_error() -> Response {
    status_response(StatusCode::INTERNAL_SERVER_ERROR)
}

use serde::Serialize;
use serde_json::Value;

use ledgerq_jobs::JobId;
use ledgerq_ledger::Asset;

// -------------------------
// Request validation
// -------------------------

/// One rejected field of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub param: String,
    pub msg: String,
}

impl FieldError {
    fn new(param: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            msg: msg.into(),
        }
    }
}

const ASSET_FIELDS: [&str; 7] = [
    "ID",
    "InsumosUtilizados",
    "Tipo",
    "DataInicio",
    "DataFinal",
    "Responsavel",
    "Status",
];

/// Every asset field must be a non-empty string.
pub fn parse_asset(body: &[u8]) -> Result<Asset, Vec<FieldError>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| vec![FieldError::new("", "body must contain an asset object")])?;
    let Value::Object(fields) = &value else {
        return Err(vec![FieldError::new("", "body must contain an asset object")]);
    };

    let errors: Vec<FieldError> = ASSET_FIELDS
        .iter()
        .filter(|name| {
            !fields
                .get(**name)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        })
        .map(|name| FieldError::new(*name, "must be a string"))
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value(value).map_err(|e| vec![FieldError::new("", e.to_string())])
}

/// A JSON patch holding exactly one `replace /Owner` operation; returns the
/// new owner.
pub fn parse_owner_patch(body: &[u8]) -> Result<String, Vec<FieldError>> {
    let single = "body must contain an array with a single patch operation";
    let value: Value =
        serde_json::from_slice(body).map_err(|_| vec![FieldError::new("", single)])?;
    let op = match value.as_array().map(Vec::as_slice) {
        Some([op]) => op,
        _ => return Err(vec![FieldError::new("", single)]),
    };

    let mut errors = Vec::new();
    if op.get("op").and_then(Value::as_str) != Some("replace") {
        errors.push(FieldError::new("[0].op", "operation must be 'replace'"));
    }
    if op.get("path").and_then(Value::as_str) != Some("/Owner") {
        errors.push(FieldError::new("[0].path", "path must be '/Owner'"));
    }
    let owner = op.get("value").and_then(Value::as_str);
    if owner.is_none() {
        errors.push(FieldError::new("[0].value", "must be a string"));
    }

    match owner {
        Some(owner) if errors.is_empty() => Ok(owner.to_string()),
        _ => Err(errors),
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub job_id: JobId,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub validation_code: String,
}

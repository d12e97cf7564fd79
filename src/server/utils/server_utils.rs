use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::OpsError;

/// Success envelope: `{code: 200, message: "success", data}`.
pub fn success(data: impl Serialize) -> Json<Value> {
    Json(json!({ "code": 200, "message": "success", "data": data }))
}

/// Success envelope with a non-default message and no data payload.
pub fn success_message(message: &str) -> Json<Value> {
    Json(json!({ "code": 200, "message": message, "data": null }))
}

/// Failure envelope: `{code: 500, message, data: null}`.
pub fn failure(message: &str) -> Json<Value> {
    Json(json!({ "code": 500, "message": message, "data": null }))
}

pub fn handle_error(err: OpsError) -> (StatusCode, Json<Value>) {
    let status = match err {
        OpsError::InvalidParam(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, failure(&err.to_string()))
}

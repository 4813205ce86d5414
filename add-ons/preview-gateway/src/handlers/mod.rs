pub(crate) mod preview;
pub(crate) mod workspace;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message, "status": "error" }))).into_response()
}

//! JSON error envelope, grounded in the teacher's `http/response.rs`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub type HttpResponse = axum::response::Response;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(ErrorEnvelope {
            code: code.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Map a domain `ErrorKind` to the HTTP status spec.md §7 assigns it.
pub fn from_error_kind(err: wk_types::ErrorKind) -> HttpResponse {
    use wk_types::ErrorKind;
    match err {
        ErrorKind::Validation(msg) => bad_request(msg),
        ErrorKind::NotFound => not_found(err.to_string()),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other.to_string()),
    }
}

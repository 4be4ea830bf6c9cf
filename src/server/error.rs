//! HTTP error response helpers.
//!
//! Every error body has the same shape: `{status, title, detail}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::ErrorResponse;

pub fn bad_request(detail: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, detail)
}

pub fn unauthorized(detail: impl Into<String>) -> Response {
    create_error(StatusCode::UNAUTHORIZED, detail)
}

pub fn not_found(detail: impl Into<String>) -> Response {
    create_error(StatusCode::NOT_FOUND, detail)
}

pub fn service_unavailable(detail: impl Into<String>) -> Response {
    create_error(StatusCode::SERVICE_UNAVAILABLE, detail)
}

pub fn internal_error(detail: impl Into<String>) -> Response {
    create_error(StatusCode::INTERNAL_SERVER_ERROR, detail)
}

pub fn create_error(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            detail: detail.into(),
            errors: vec![],
        }),
    )
        .into_response()
}

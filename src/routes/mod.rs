use axum::http::StatusCode;
use axum::Json;

use crate::models::api::ErrorBody;

pub mod fittings;
pub mod health;
pub mod metrics;
pub mod videos;

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(msg)))
}

pub fn not_found(msg: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new(msg)))
}

pub fn conflict(msg: impl Into<String>, code: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(ErrorBody::with_code(msg, code)))
}

pub fn bad_gateway(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_GATEWAY, Json(ErrorBody::new(msg)))
}

pub fn gateway_timeout(msg: impl Into<String>) -> ApiError {
    (StatusCode::GATEWAY_TIMEOUT, Json(ErrorBody::new(msg)))
}

pub fn internal_error(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(msg)),
    )
}

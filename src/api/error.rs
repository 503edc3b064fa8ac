//! HTTP error type rendered as `{"detail": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 500 with the error's display text.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    /// 400 with the error's display text.
    pub fn bad_request(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        } else {
            tracing::warn!(status = %self.status, detail = %self.detail, "request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_status() {
        assert_eq!(ApiError::internal("boom").status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::bad_request("nope").status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::internal("boom").detail, "boom");
    }

    #[test]
    fn into_response_keeps_status() {
        let response = ApiError::bad_request("bad table").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

//! HTTP rendering of [`ApiError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::models::ErrorModel;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorModel::from(&self);

        if self.is_internal() {
            error!(error = %self, body = ?body, "Request failed");
        } else {
            debug!(status = status.as_u16(), body = ?body, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}

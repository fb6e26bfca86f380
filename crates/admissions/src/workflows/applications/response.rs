use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::service::ApplicationServiceError;
use super::validation::ValidationError;

pub(crate) fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let payload = json!({
        "success": true,
        "message": message,
        "data": data,
    });
    (status, Json(payload)).into_response()
}

pub(crate) fn failure(status: StatusCode, message: &str) -> Response {
    let payload = json!({
        "success": false,
        "message": message,
    });
    (status, Json(payload)).into_response()
}

pub(crate) fn validation_failure(error: &ValidationError) -> Response {
    let payload = json!({
        "success": false,
        "message": "Validation failed",
        "errors": error.violations,
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

/// Map a service error onto the envelope. Storage detail is logged, never returned.
pub(crate) fn service_failure(err: ApplicationServiceError) -> Response {
    match err {
        ApplicationServiceError::Validation(violations) => validation_failure(&violations),
        ApplicationServiceError::ApplicationNotFound(_) => {
            failure(StatusCode::NOT_FOUND, "Application not found")
        }
        ApplicationServiceError::DocumentNotFound { .. } => {
            failure(StatusCode::NOT_FOUND, "Document not found")
        }
        err if err.is_not_found() => failure(StatusCode::NOT_FOUND, "Application not found"),
        other => {
            error!(error = %other, "application request failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error while processing the application",
            )
        }
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::ErrorResponse;
use crate::domain::error::NotificationError;

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            NotificationError::Validation { .. } => {
                (StatusCode::BAD_REQUEST, "SYS_NOTIFICATION_VALIDATION_ERROR")
            }
            NotificationError::StateConflict(_) => (StatusCode::CONFLICT, "SYS_NOTIFICATION_CONFLICT"),
            NotificationError::NotFound(_) => (StatusCode::NOT_FOUND, "SYS_NOTIFICATION_NOT_FOUND"),
            NotificationError::Dependency(_) => {
                (StatusCode::BAD_GATEWAY, "SYS_NOTIFICATION_DEPENDENCY_ERROR")
            }
        };

        let body = match &self {
            NotificationError::Validation { field, message } => {
                ErrorResponse::new(code, message).with_details(vec![field.clone()])
            }
            NotificationError::Dependency(msg) => {
                tracing::error!(error = %msg, "dependency failure");
                ErrorResponse::new(code, "upstream dependency failed")
            }
            NotificationError::StateConflict(msg) | NotificationError::NotFound(msg) => {
                ErrorResponse::new(code, msg)
            }
        };
        (status, Json(body)).into_response()
    }
}

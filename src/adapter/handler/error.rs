use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::ErrorResponse;
use crate::domain::entity::batch_import_job::TransitionError;
use crate::usecase::BatchImportError;

/// ApiError はバッチインポート API のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Batch(#[from] BatchImportError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Vec<String>) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "SYS_BATCH_VALIDATION_ERROR", vec![]),
            ApiError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "SYS_BATCH_PAYLOAD_TOO_LARGE",
                vec![],
            ),
            ApiError::Batch(err) => match err {
                BatchImportError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "SYS_BATCH_NOT_FOUND", vec![])
                }
                BatchImportError::CatalogNotFound(_) => {
                    (StatusCode::NOT_FOUND, "SYS_BATCH_CATALOG_NOT_FOUND", vec![])
                }
                BatchImportError::Transition(TransitionError::InvalidStateTransition {
                    current,
                    action,
                }) => (
                    StatusCode::CONFLICT,
                    "SYS_BATCH_INVALID_STATE_TRANSITION",
                    vec![format!("current_state: {current}"), format!("action: {action}")],
                ),
                BatchImportError::Transition(TransitionError::SourceFileMissing(_)) => {
                    (StatusCode::CONFLICT, "SYS_BATCH_FILE_REQUIRED", vec![])
                }
                BatchImportError::Transition(TransitionError::CheckpointInvalid { .. }) => {
                    (StatusCode::CONFLICT, "SYS_BATCH_CHECKPOINT_INVALID", vec![])
                }
                BatchImportError::InvalidFile(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "SYS_BATCH_INVALID_FILE",
                    vec![],
                ),
                BatchImportError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "SYS_BATCH_VALIDATION_ERROR", vec![])
                }
                BatchImportError::Internal(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SYS_BATCH_INTERNAL_ERROR",
                    vec![],
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "batch import request failed");
        }

        let body = ErrorResponse::new(code, &self.to_string()).with_details(details);
        (status, Json(body)).into_response()
    }
}

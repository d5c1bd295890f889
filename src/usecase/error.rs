use uuid::Uuid;

use crate::domain::entity::batch_import_job::TransitionError;
use crate::domain::service::csv_inspector::FileValidationError;

/// BatchImportError はコントロール操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum BatchImportError {
    #[error("batch import job not found: {0}")]
    NotFound(Uuid),

    #[error("catalog not found: {0}")]
    CatalogNotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid file: {0}")]
    InvalidFile(#[from] FileValidationError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

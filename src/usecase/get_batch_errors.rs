use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::row_error::BatchImportRowError;
use crate::domain::repository::BatchImportJobRepository;
use crate::usecase::error::BatchImportError;

/// GetBatchErrorsUseCase はジョブの行エラーを行番号の昇順で返す。実行中でも取得できる。
pub struct GetBatchErrorsUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
}

impl GetBatchErrorsUseCase {
    pub fn new(job_repo: Arc<dyn BatchImportJobRepository>) -> Self {
        Self { job_repo }
    }

    pub async fn execute(&self, job_id: Uuid) -> Result<Vec<BatchImportRowError>, BatchImportError> {
        if self.job_repo.find_by_id(job_id).await?.is_none() {
            return Err(BatchImportError::NotFound(job_id));
        }
        Ok(self.job_repo.find_errors(job_id).await?)
    }
}

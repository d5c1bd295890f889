use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::batch_import_job::BatchImportJob;
use crate::domain::repository::BatchImportJobRepository;
use crate::usecase::error::BatchImportError;

/// GetBatchUseCase はジョブの状態とカウンタを取得する。
pub struct GetBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
}

impl GetBatchUseCase {
    pub fn new(job_repo: Arc<dyn BatchImportJobRepository>) -> Self {
        Self { job_repo }
    }

    pub async fn execute(&self, job_id: Uuid) -> Result<BatchImportJob, BatchImportError> {
        self.job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(BatchImportError::NotFound(job_id))
    }
}

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{JobAction, TransitionError};
use crate::domain::repository::BatchImportJobRepository;
use crate::infrastructure::file_storage::SourceFileStorage;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::error::BatchImportError;

/// DeleteBatchUseCase は pending または終端状態のジョブを行エラーとファイルごと削除する。
pub struct DeleteBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    storage: Arc<dyn SourceFileStorage>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl DeleteBatchUseCase {
    pub fn new(
        job_repo: Arc<dyn BatchImportJobRepository>,
        storage: Arc<dyn SourceFileStorage>,
        publisher: Option<Arc<dyn BatchEventPublisher>>,
    ) -> Self {
        Self {
            job_repo,
            storage,
            publisher,
        }
    }

    pub async fn execute(&self, job_id: Uuid) -> Result<(), BatchImportError> {
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(BatchImportError::NotFound(job_id))?;
        job.status.next(JobAction::Delete)?;

        if !self.job_repo.delete(job_id, job.status).await? {
            let current = self
                .job_repo
                .find_by_id(job_id)
                .await?
                .ok_or(BatchImportError::NotFound(job_id))?;
            return Err(TransitionError::InvalidStateTransition {
                current: current.status,
                action: JobAction::Delete,
            }
            .into());
        }

        if let Some(file) = &job.source_file {
            if let Err(e) = self.storage.delete(&file.storage_key).await {
                warn!(job_id = %job_id, error = %e, "failed to delete source file");
            }
        }

        info!(job_id = %job_id, status = %job.status, "batch import job deleted");
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_DELETED,
            serde_json::json!({ "status": job.status }),
        )
        .await;
        Ok(())
    }
}

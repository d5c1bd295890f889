use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction};
use crate::domain::repository::BatchImportJobRepository;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::batch_scheduler::BatchScheduler;
use crate::usecase::error::BatchImportError;
use crate::usecase::job_transition::transition_job;

/// ResumeBatchUseCase は paused のジョブをチェックポイントの次の行から再開する。
pub struct ResumeBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl ResumeBatchUseCase {
    pub fn new(
        job_repo: Arc<dyn BatchImportJobRepository>,
        scheduler: Arc<BatchScheduler>,
        publisher: Option<Arc<dyn BatchEventPublisher>>,
    ) -> Self {
        Self {
            job_repo,
            scheduler,
            publisher,
        }
    }

    pub async fn execute(&self, job_id: Uuid) -> Result<BatchImportJob, BatchImportError> {
        let job = transition_job(self.job_repo.as_ref(), job_id, JobAction::Resume).await?;

        info!(
            job_id = %job_id,
            next_row = job.next_row_number(),
            "batch import resumed"
        );
        self.scheduler.schedule(job_id);
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_RESUMED,
            serde_json::json!({ "checkpoint_row_index": job.checkpoint_row_index }),
        )
        .await;
        Ok(job)
    }
}

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction};
use crate::domain::repository::BatchImportJobRepository;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::batch_scheduler::BatchScheduler;
use crate::usecase::error::BatchImportError;
use crate::usecase::execution_registry::ControlSignal;
use crate::usecase::job_transition::transition_job;

/// CancelBatchUseCase は終端でないジョブを cancelled にする。キャンセルは取り消せない。
/// チェックポイントと行エラーは監査用に残る。
pub struct CancelBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl CancelBatchUseCase {
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
        let job = transition_job(self.job_repo.as_ref(), job_id, JobAction::Cancel).await?;
        self.scheduler.signal(job_id, ControlSignal::Cancel);

        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_row_index,
            "batch import cancelled"
        );
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_CANCELLED,
            serde_json::json!({ "checkpoint_row_index": job.checkpoint_row_index }),
        )
        .await;

        Ok(job)
    }
}

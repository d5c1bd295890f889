use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction};
use crate::domain::repository::BatchImportJobRepository;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::batch_scheduler::BatchScheduler;
use crate::usecase::error::BatchImportError;
use crate::usecase::job_transition::transition_job;

/// StartBatchUseCase はファイル添付済みのジョブを processing にしてランナーを起動する。
pub struct StartBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl StartBatchUseCase {
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

    /// ジョブを開始する。ランナーはバックグラウンドで動き、この呼び出しは待たない。
    pub async fn execute(&self, job_id: Uuid) -> Result<BatchImportJob, BatchImportError> {
        let job = transition_job(self.job_repo.as_ref(), job_id, JobAction::Start).await?;

        info!(job_id = %job_id, total_rows = job.total_rows, "batch import started");
        self.scheduler.schedule(job_id);
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_STARTED,
            serde_json::json!({ "total_rows": job.total_rows }),
        )
        .await;
        Ok(job)
    }
}

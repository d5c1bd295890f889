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

/// PauseBatchUseCase は processing のジョブを paused にし、実行中のランナーに停止を伝える。
/// ランナーは処理中の行をコミットしてから止まる。
pub struct PauseBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl PauseBatchUseCase {
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
        let job = transition_job(self.job_repo.as_ref(), job_id, JobAction::Pause).await?;
        let signalled = self.scheduler.signal(job_id, ControlSignal::Pause);

        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_row_index,
            runner_active = signalled,
            "batch import paused"
        );
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_PAUSED,
            serde_json::json!({ "checkpoint_row_index": job.checkpoint_row_index }),
        )
        .await;

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::batch_import_job::{JobStatus, TransitionError};
    use crate::test_support::{RecordingProductApplier, TestContext};
    use crate::usecase::RunnerSettings;

    const FIVE_ROWS: &str = "sku,name,price\nA,a,1\nB,b,2\nC,c,3\nD,d,4\nE,e,5\n";

    #[tokio::test]
    async fn test_pause_stops_after_current_row() {
        let ctx = TestContext::with_applier(
            RecordingProductApplier::new().holding_at(2),
            RunnerSettings::default(),
        );
        let job = ctx.create_job_with_file(FIVE_ROWS).await.unwrap();
        ctx.start_batch_uc().execute(job.id).await.unwrap();

        ctx.applier.wait_until_held().await;
        let paused = ctx.pause_batch_uc().execute(job.id).await.unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
        ctx.applier.release_hold();

        let stored = ctx.wait_for_status(job.id, JobStatus::Paused).await.unwrap();
        assert_eq!(stored.checkpoint_row_index, 2);
        assert_eq!(stored.processed_rows, 2);
        assert!(stored.is_resumable());
        assert_eq!(ctx.applier.rows_for(job.id), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_pause_pending_job_is_invalid() {
        let ctx = TestContext::new();
        let job = ctx
            .create_job_with_file("sku,name,price\nA,a,1\n")
            .await
            .unwrap();

        let result = ctx.pause_batch_uc().execute(job.id).await;
        assert!(matches!(
            result,
            Err(BatchImportError::Transition(
                TransitionError::InvalidStateTransition {
                    current: JobStatus::Pending,
                    action: JobAction::Pause
                }
            ))
        ));
    }
}

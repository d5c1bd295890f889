use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction};
use crate::domain::repository::BatchImportJobRepository;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::batch_scheduler::BatchScheduler;
use crate::usecase::error::BatchImportError;
use crate::usecase::job_transition::transition_job;

/// RetryBatchUseCase は failed のジョブをチェックポイントから再実行する。
/// `retrying` は failed → processing の途中のラベルで、状態としては保存しない。
/// 既存のカウンタと行エラーはそのまま残る。
pub struct RetryBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl RetryBatchUseCase {
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
        let job = transition_job(self.job_repo.as_ref(), job_id, JobAction::Retry).await?;

        info!(
            job_id = %job_id,
            next_row = job.next_row_number(),
            "batch import retrying"
        );
        self.scheduler.schedule(job_id);
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_RETRYING,
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
    use crate::infrastructure::file_storage::SourceFileStorage;
    use crate::test_support::TestContext;

    #[tokio::test]
    async fn test_retry_failed_job_keeps_counters() {
        let ctx = TestContext::new();
        let job = ctx
            .create_job_with_file("sku,name,price\nA,a,1\nB,,2\nC,c,3\n")
            .await
            .unwrap();
        let key = job.source_file.as_ref().unwrap().storage_key.clone();
        let bytes = ctx.storage.read(&key).await.unwrap();

        // ファイルが消えた状態で開始すると failed になる
        ctx.storage.remove(&key).await;
        ctx.start_batch_uc().execute(job.id).await.unwrap();
        let failed = ctx.wait_for_status(job.id, JobStatus::Failed).await.unwrap();
        assert!(failed.error_message.is_some());
        assert!(failed.is_resumable());

        // ファイルを戻して再実行する
        ctx.storage.put_at(&key, bytes).await;
        let retried = ctx.retry_batch_uc().execute(job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Processing);
        assert!(retried.error_message.is_none());

        let done = ctx
            .wait_for_status(job.id, JobStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.success_rows, 2);
        assert_eq!(done.error_rows, 1);
        assert!(ctx
            .publisher
            .event_types(job.id)
            .contains(&"BATCH_RETRYING".to_string()));
    }

    #[tokio::test]
    async fn test_retry_pending_job_is_invalid() {
        let ctx = TestContext::new();
        let job = ctx
            .create_job_with_file("sku,name,price\nA,a,1\n")
            .await
            .unwrap();
        let result = ctx.retry_batch_uc().execute(job.id).await;
        assert!(matches!(
            result,
            Err(BatchImportError::Transition(
                TransitionError::InvalidStateTransition {
                    current: JobStatus::Pending,
                    action: JobAction::Retry
                }
            ))
        ));
    }
}

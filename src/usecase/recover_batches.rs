use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::entity::batch_import_job::JobStatus;
use crate::domain::repository::BatchImportJobRepository;
use crate::usecase::batch_scheduler::BatchScheduler;

/// RecoverBatchesUseCase は起動時に processing のまま残ったジョブをチェックポイントから再開する。
pub struct RecoverBatchesUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    scheduler: Arc<BatchScheduler>,
}

impl RecoverBatchesUseCase {
    pub fn new(job_repo: Arc<dyn BatchImportJobRepository>, scheduler: Arc<BatchScheduler>) -> Self {
        Self {
            job_repo,
            scheduler,
        }
    }

    /// 再開を予約したジョブ数を返す。
    pub async fn execute(&self) -> anyhow::Result<usize> {
        let jobs = self.job_repo.find_by_status(JobStatus::Processing).await?;
        if jobs.is_empty() {
            info!("no interrupted batch imports to recover");
            return Ok(0);
        }

        let mut scheduled = 0;
        for job in &jobs {
            if self.scheduler.schedule(job.id).is_some() {
                info!(
                    job_id = %job.id,
                    next_row = job.next_row_number(),
                    "recovering interrupted batch import"
                );
                scheduled += 1;
            } else {
                warn!(job_id = %job.id, "batch import already running, skipped recovery");
            }
        }
        Ok(scheduled)
    }
}

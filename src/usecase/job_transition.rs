use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction};
use crate::domain::repository::BatchImportJobRepository;
use crate::usecase::error::BatchImportError;

const MAX_ATTEMPTS: usize = 3;

/// ジョブを読み込み、遷移ガードを評価して状態を比較更新する。
/// 比較更新に負けた場合は最新の状態を読み直して再評価する。
pub(crate) async fn transition_job(
    repo: &dyn BatchImportJobRepository,
    job_id: Uuid,
    action: JobAction,
) -> Result<BatchImportJob, BatchImportError> {
    for _ in 0..MAX_ATTEMPTS {
        let mut job = repo
            .find_by_id(job_id)
            .await?
            .ok_or(BatchImportError::NotFound(job_id))?;

        let previous = job.transition(action)?;
        if repo.transition_status(&job, previous).await? {
            return Ok(job);
        }
        tracing::debug!(job_id = %job_id, action = %action, "job state changed concurrently, retrying");
    }
    Err(BatchImportError::Internal(anyhow::anyhow!(
        "batch import job {} kept changing while applying {}",
        job_id,
        action
    )))
}

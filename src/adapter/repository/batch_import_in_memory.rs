use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobStatus};
use crate::domain::entity::row_error::BatchImportRowError;
use crate::domain::repository::batch_import_job_repository::{
    BatchImportJobRepository, BatchImportListParams,
};

#[derive(Default)]
struct Inner {
    jobs: Vec<BatchImportJob>,
    errors: Vec<BatchImportRowError>,
}

/// InMemoryBatchImportRepository は開発・テスト用のインメモリ実装。
/// ジョブと行エラーを 1 つのロックで保護し、行コミットを原子的に行う。
#[derive(Default)]
pub struct InMemoryBatchImportRepository {
    inner: RwLock<Inner>,
}

impl InMemoryBatchImportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchImportJobRepository for InMemoryBatchImportRepository {
    async fn create(&self, job: &BatchImportJob) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.iter().any(|j| j.id == job.id) {
            anyhow::bail!("batch import job already exists: {}", job.id);
        }
        inner.jobs.push(job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<BatchImportJob>> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list(
        &self,
        params: &BatchImportListParams,
    ) -> anyhow::Result<(Vec<BatchImportJob>, i64)> {
        let inner = self.inner.read().await;
        let mut filtered: Vec<_> = inner
            .jobs
            .iter()
            .filter(|j| params.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = i64::try_from(filtered.len())?;
        let page = usize::try_from(params.page.max(1))?;
        let page_size = usize::try_from(params.page_size.max(1))?;
        let paged = filtered
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        Ok((paged, total))
    }

    async fn attach_file(
        &self,
        job: &BatchImportJob,
        previous_storage_key: Option<String>,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.jobs.iter_mut().find(|j| {
            j.id == job.id
                && j.status == JobStatus::Pending
                && j.source_file.as_ref().map(|f| f.storage_key.as_str())
                    == previous_storage_key.as_deref()
        }) else {
            return Ok(false);
        };
        stored.source_file.clone_from(&job.source_file);
        stored.total_rows = job.total_rows;
        stored.updated_at = job.updated_at;
        Ok(true)
    }

    async fn transition_status(
        &self,
        job: &BatchImportJob,
        expected: JobStatus,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id && j.status == expected)
        else {
            return Ok(false);
        };
        stored.status = job.status;
        stored.error_message.clone_from(&job.error_message);
        stored.completed_at = job.completed_at;
        stored.updated_at = job.updated_at;
        Ok(true)
    }

    async fn commit_row(
        &self,
        job: &BatchImportJob,
        expected_checkpoint: i64,
        errors: &[BatchImportRowError],
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id && j.checkpoint_row_index == expected_checkpoint)
        else {
            return Ok(false);
        };
        stored.processed_rows = job.processed_rows;
        stored.success_rows = job.success_rows;
        stored.error_rows = job.error_rows;
        stored.checkpoint_row_index = job.checkpoint_row_index;
        stored.updated_at = job.updated_at;
        inner.errors.extend_from_slice(errors);
        Ok(true)
    }

    async fn find_errors(&self, job_id: Uuid) -> anyhow::Result<Vec<BatchImportRowError>> {
        let inner = self.inner.read().await;
        let mut errors: Vec<_> = inner
            .errors
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        // 安定ソートなので同じ行内では記録順を保つ
        errors.sort_by_key(|e| e.row_number);
        Ok(errors)
    }

    async fn delete(&self, id: Uuid, expected: JobStatus) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.jobs.len();
        inner.jobs.retain(|j| !(j.id == id && j.status == expected));
        if inner.jobs.len() == before {
            return Ok(false);
        }
        inner.errors.retain(|e| e.job_id != id);
        Ok(true)
    }

    async fn find_by_status(&self, status: JobStatus) -> anyhow::Result<Vec<BatchImportJob>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }
}

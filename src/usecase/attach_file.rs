use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{
    BatchImportJob, JobAction, JobStatus, TransitionError,
};
use crate::domain::repository::{BatchImportJobRepository, CatalogRepository};
use crate::domain::service::csv_inspector::{CsvFileInspector, FileLimits};
use crate::infrastructure::file_storage::SourceFileStorage;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::error::BatchImportError;

/// AttachFileUseCase は pending のジョブに CSV を検証して添付する。
pub struct AttachFileUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    storage: Arc<dyn SourceFileStorage>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
    limits: FileLimits,
}

impl AttachFileUseCase {
    pub fn new(
        job_repo: Arc<dyn BatchImportJobRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        storage: Arc<dyn SourceFileStorage>,
        publisher: Option<Arc<dyn BatchEventPublisher>>,
        limits: FileLimits,
    ) -> Self {
        Self {
            job_repo,
            catalog_repo,
            storage,
            publisher,
            limits,
        }
    }

    /// ファイルを検証・保存してジョブに添付する。既に添付済みの場合は置き換える。
    pub async fn execute(
        &self,
        job_id: Uuid,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<BatchImportJob, BatchImportError> {
        let mut job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(BatchImportError::NotFound(job_id))?;
        job.status.next(JobAction::AttachFile)?;

        let schema = self
            .catalog_repo
            .find_schema(job.catalog_id)
            .await?
            .ok_or_else(|| BatchImportError::CatalogNotFound(job.catalog_id.unwrap_or_default()))?;
        let inspection = CsvFileInspector::inspect(&bytes, &schema, self.limits)?;

        let file = self.storage.put(job_id, original_name, bytes).await?;
        let mut previous = job.source_file.take();
        job.attach_file(file.clone(), inspection.total_rows)?;

        // 置き換えるファイルのキーを条件に書き込み、別のアップロードが先に添付していれば
        // そのファイルを置き換え対象にしてやり直す
        while !self
            .job_repo
            .attach_file(&job, previous.as_ref().map(|f| f.storage_key.clone()))
            .await?
        {
            let current = self.job_repo.find_by_id(job_id).await?;
            match current {
                Some(current) if current.status == JobStatus::Pending => {
                    previous = current.source_file;
                }
                Some(current) => {
                    self.discard(&file.storage_key).await;
                    return Err(TransitionError::InvalidStateTransition {
                        current: current.status,
                        action: JobAction::AttachFile,
                    }
                    .into());
                }
                None => {
                    self.discard(&file.storage_key).await;
                    return Err(BatchImportError::NotFound(job_id));
                }
            }
        }

        if let Some(previous) = previous {
            self.discard(&previous.storage_key).await;
        }

        info!(
            job_id = %job_id,
            file = %file.original_name,
            size_bytes = file.size_bytes,
            total_rows = job.total_rows,
            "source file attached"
        );
        kafka_producer::notify(
            self.publisher.as_ref(),
            job_id,
            kafka_producer::BATCH_FILE_ATTACHED,
            serde_json::json!({
                "file_name": file.original_name,
                "total_rows": job.total_rows,
                "checksum_sha256": file.checksum_sha256,
            }),
        )
        .await;

        Ok(job)
    }

    async fn discard(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete(storage_key).await {
            warn!(storage_key, error = %e, "failed to delete source file");
        }
    }
}

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::BatchImportJob;
use crate::domain::repository::{BatchImportJobRepository, CatalogRepository};
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::usecase::error::BatchImportError;

const NAME_MAX_LEN: usize = 255;

/// CreateBatchInput はジョブ作成の入力。
#[derive(Debug, Clone)]
pub struct CreateBatchInput {
    pub name: String,
    pub description: Option<String>,
    pub catalog_id: Option<Uuid>,
}

/// CreateBatchUseCase は pending 状態のジョブを作成する。
pub struct CreateBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl CreateBatchUseCase {
    pub fn new(
        job_repo: Arc<dyn BatchImportJobRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        publisher: Option<Arc<dyn BatchEventPublisher>>,
    ) -> Self {
        Self {
            job_repo,
            catalog_repo,
            publisher,
        }
    }

    pub async fn execute(&self, input: CreateBatchInput) -> Result<BatchImportJob, BatchImportError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(BatchImportError::Validation("name is required".to_string()));
        }
        if name.chars().count() > NAME_MAX_LEN {
            return Err(BatchImportError::Validation(format!(
                "name must be at most {NAME_MAX_LEN} characters"
            )));
        }

        if let Some(catalog_id) = input.catalog_id {
            if self.catalog_repo.find_schema(Some(catalog_id)).await?.is_none() {
                return Err(BatchImportError::CatalogNotFound(catalog_id));
            }
        }

        let description = input.description.filter(|d| !d.trim().is_empty());
        let job = BatchImportJob::new(name, description, input.catalog_id);
        self.job_repo.create(&job).await?;

        info!(job_id = %job.id, name = %job.name, "batch import job created");
        kafka_producer::notify(
            self.publisher.as_ref(),
            job.id,
            kafka_producer::BATCH_CREATED,
            serde_json::json!({
                "name": job.name,
                "catalog_id": job.catalog_id,
            }),
        )
        .await;

        Ok(job)
    }
}

use std::sync::Arc;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobStatus};
use crate::domain::repository::{BatchImportJobRepository, BatchImportListParams};
use crate::usecase::error::BatchImportError;

const DEFAULT_PAGE_SIZE: i32 = 20;
const MAX_PAGE_SIZE: i32 = 100;

/// ListBatchesInput はジョブ一覧の絞り込みとページング。
#[derive(Debug, Clone, Default)]
pub struct ListBatchesInput {
    pub status: Option<JobStatus>,
    pub page: Option<i32>,
    pub page_size: Option<i32>,
}

/// ListBatchesOutput はジョブ一覧の結果。
#[derive(Debug, Clone)]
pub struct ListBatchesOutput {
    pub jobs: Vec<BatchImportJob>,
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
    pub has_next: bool,
}

/// ListBatchesUseCase はジョブを作成日時の新しい順に返す。
pub struct ListBatchesUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
}

impl ListBatchesUseCase {
    pub fn new(job_repo: Arc<dyn BatchImportJobRepository>) -> Self {
        Self { job_repo }
    }

    pub async fn execute(&self, input: ListBatchesInput) -> Result<ListBatchesOutput, BatchImportError> {
        let page = input.page.unwrap_or(1);
        let page_size = input.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(BatchImportError::Validation(
                "page must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(BatchImportError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let params = BatchImportListParams {
            status: input.status,
            page,
            page_size,
        };
        let (jobs, total_count) = self.job_repo.list(&params).await?;
        let has_next = i64::from(page) * i64::from(page_size) < total_count;

        Ok(ListBatchesOutput {
            jobs,
            total_count,
            page,
            page_size,
            has_next,
        })
    }
}

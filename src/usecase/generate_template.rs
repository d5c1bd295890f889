use std::sync::Arc;

use uuid::Uuid;

use crate::domain::repository::CatalogRepository;
use crate::usecase::error::BatchImportError;

/// GenerateTemplateUseCase はカタログの CSV テンプレート（ヘッダー行のみ）を生成する。
pub struct GenerateTemplateUseCase {
    catalog_repo: Arc<dyn CatalogRepository>,
}

impl GenerateTemplateUseCase {
    pub fn new(catalog_repo: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog_repo }
    }

    pub async fn execute(&self, catalog_id: Option<Uuid>) -> Result<String, BatchImportError> {
        let schema = self
            .catalog_repo
            .find_schema(catalog_id)
            .await?
            .ok_or_else(|| BatchImportError::CatalogNotFound(catalog_id.unwrap_or_default()))?;
        Ok(format!("{}\n", schema.template_header()))
    }
}

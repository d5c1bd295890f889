use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::catalog_schema::CatalogSchema;
use crate::domain::repository::CatalogRepository;

/// InMemoryCatalogRepository は起動時に読み込んだカタログスキーマを保持する。
/// 既定カタログ（catalog_id なし）が登録されていない場合はコア列のみのスキーマを返す。
pub struct InMemoryCatalogRepository {
    schemas: RwLock<HashMap<Option<Uuid>, CatalogSchema>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCatalogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_schema(&self, catalog_id: Option<Uuid>) -> anyhow::Result<Option<CatalogSchema>> {
        let schemas = self.schemas.read().await;
        match (schemas.get(&catalog_id), catalog_id) {
            (Some(schema), _) => Ok(Some(schema.clone())),
            (None, None) => Ok(Some(CatalogSchema::core_only())),
            (None, Some(_)) => Ok(None),
        }
    }

    async fn register(&self, schema: CatalogSchema) -> anyhow::Result<()> {
        schema.validate()?;
        let mut schemas = self.schemas.write().await;
        schemas.insert(schema.catalog_id, schema);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_schema_falls_back_to_core_only() {
        let repo = InMemoryCatalogRepository::new();
        let schema = repo.find_schema(None).await.unwrap().unwrap();
        assert_eq!(schema, CatalogSchema::core_only());
        assert!(repo.find_schema(Some(Uuid::new_v4())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_and_find() {
        let repo = InMemoryCatalogRepository::new();
        let id = Uuid::new_v4();
        let mut schema = CatalogSchema::core_only();
        schema.catalog_id = Some(id);
        schema.name = "apparel".to_string();
        repo.register(schema).await.unwrap();

        let found = repo.find_schema(Some(id)).await.unwrap().unwrap();
        assert_eq!(found.name, "apparel");
    }

    #[tokio::test]
    async fn test_registered_default_overrides_builtin() {
        let repo = InMemoryCatalogRepository::new();
        let mut schema = CatalogSchema::core_only();
        schema.deprecated_columns.push("legacy_code".to_string());
        repo.register(schema).await.unwrap();

        let found = repo.find_schema(None).await.unwrap().unwrap();
        assert!(found.is_deprecated("legacy_code"));
    }
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::catalog_schema::CatalogSchema;

/// CatalogRepository は行バリデーションに使うカタログスキーマの参照トレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// カタログスキーマを取得する。None は既定カタログ。
    async fn find_schema(&self, catalog_id: Option<Uuid>) -> anyhow::Result<Option<CatalogSchema>>;

    /// スキーマを登録する。同じ catalog_id の既存スキーマは置き換える。
    async fn register(&self, schema: CatalogSchema) -> anyhow::Result<()>;
}

use std::path::{Path, PathBuf};

use crate::domain::entity::catalog_schema::CatalogSchema;

/// CatalogLoader はディスク上の YAML ファイルからカタログスキーマを読み込む。
pub struct CatalogLoader {
    catalog_dir: PathBuf,
}

impl CatalogLoader {
    pub fn new(catalog_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
        }
    }

    /// ディレクトリ内の全 .yaml/.yml ファイルを読み込む。
    /// ディレクトリが存在しない場合は空のリストを返す。不正なファイルは警告を出してスキップする。
    pub async fn load_all(&self) -> anyhow::Result<Vec<CatalogSchema>> {
        if !self.catalog_dir.exists() {
            tracing::warn!(
                dir = %self.catalog_dir.display(),
                "catalog directory does not exist, using the built-in default schema only"
            );
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.catalog_dir).await?;
        let mut schemas = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if ext != "yaml" && ext != "yml" {
                continue;
            }

            match self.load_file(&path).await {
                Ok(schema) => {
                    tracing::info!(
                        file = %path.display(),
                        name = %schema.name,
                        attributes = schema.attributes.len(),
                        "loaded catalog schema"
                    );
                    schemas.push(schema);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "failed to load catalog schema, skipping"
                    );
                }
            }
        }

        Ok(schemas)
    }

    /// 指定ファイルを読み込む。
    pub async fn load_file(&self, path: &Path) -> anyhow::Result<CatalogSchema> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read file {}: {}", path.display(), e))?;
        CatalogSchema::from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse catalog from {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const APPAREL_YAML: &str = r#"
catalog_id: "6f1c2d4e-8a3b-4c5d-9e7f-112233445566"
name: apparel
attributes:
  - code: color
    type: options
    values: [red, blue]
    multi: true
"#;

    const DEFAULT_YAML: &str = r#"
name: default
deprecated_columns: [legacy_code]
"#;

    const INVALID_YAML: &str = r#"
name: broken
attributes:
  - code: sku
    type: text
"#;

    #[tokio::test]
    async fn test_load_all_nonexistent_dir() {
        let loader = CatalogLoader::new("/tmp/k1s0-batch-import-test-nonexistent-dir");
        assert!(loader.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_skips_invalid_and_non_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("apparel.yaml"), APPAREL_YAML).unwrap();
        fs::write(dir.path().join("default.yml"), DEFAULT_YAML).unwrap();
        fs::write(dir.path().join("broken.yaml"), INVALID_YAML).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = CatalogLoader::new(dir.path());
        let mut schemas = loader.load_all().await.unwrap();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].name, "apparel");
        assert!(schemas[0].catalog_id.is_some());
        assert_eq!(schemas[1].name, "default");
        assert!(schemas[1].catalog_id.is_none());
    }

    #[tokio::test]
    async fn test_load_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, INVALID_YAML).unwrap();

        let loader = CatalogLoader::new(dir.path());
        let msg = loader.load_file(&path).await.unwrap_err().to_string();
        assert!(msg.contains("failed to parse catalog"), "unexpected error: {msg}");
    }
}

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::SourceFile;

/// SourceFileStorage はアップロードされた CSV の保存先トレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFileStorage: Send + Sync {
    /// ファイルを保存し、参照情報を返す。
    async fn put(
        &self,
        job_id: Uuid,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<SourceFile>;

    /// ファイル内容を読み出す。
    async fn read(&self, storage_key: &str) -> anyhow::Result<Vec<u8>>;

    /// ファイルを削除する。存在しない場合もエラーにしない。
    async fn delete(&self, storage_key: &str) -> anyhow::Result<()>;
}

/// ストレージキーを組み立てる（`{job_id}/{upload_id}-{安全化したファイル名}`）。
/// アップロードごとに別のキーになるため、差し替え中も以前のファイルは残る。
pub fn storage_key(job_id: Uuid, upload_id: Uuid, original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let upload_id = upload_id.simple();
    if sanitized.is_empty() {
        format!("{job_id}/{upload_id}-upload.csv")
    } else {
        format!("{job_id}/{upload_id}-{sanitized}")
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn source_file(job_id: Uuid, original_name: &str, bytes: &[u8]) -> anyhow::Result<SourceFile> {
    Ok(SourceFile {
        original_name: original_name.to_string(),
        storage_key: storage_key(job_id, Uuid::new_v4(), original_name),
        size_bytes: i64::try_from(bytes.len())?,
        checksum_sha256: checksum(bytes),
    })
}

/// LocalFileStorage はローカルディスク上のディレクトリに保存する実装。
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, storage_key: &str) -> anyhow::Result<PathBuf> {
        let key = Path::new(storage_key);
        if key
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("invalid storage key: {}", storage_key);
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl SourceFileStorage for LocalFileStorage {
    async fn put(
        &self,
        job_id: Uuid,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<SourceFile> {
        let file = source_file(job_id, original_name, &bytes)?;
        let path = self.resolve(&file.storage_key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // 一時ファイル経由で書き込む
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(file)
    }

    async fn read(&self, storage_key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(storage_key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read source file {}: {}", storage_key, e))
    }

    async fn delete(&self, storage_key: &str) -> anyhow::Result<()> {
        let path = self.resolve(storage_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

/// InMemoryFileStorage はテスト・開発用のインメモリ実装。
#[derive(Default)]
pub struct InMemoryFileStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みファイルを取り除く（ストレージ障害の再現用）。
    pub async fn remove(&self, storage_key: &str) {
        self.files.write().await.remove(storage_key);
    }

    /// 指定キーに内容を書き込む（障害からの復旧の再現用）。
    pub async fn put_at(&self, storage_key: &str, bytes: Vec<u8>) {
        self.files
            .write()
            .await
            .insert(storage_key.to_string(), bytes);
    }

    pub async fn contains(&self, storage_key: &str) -> bool {
        self.files.read().await.contains_key(storage_key)
    }
}

#[async_trait]
impl SourceFileStorage for InMemoryFileStorage {
    async fn put(
        &self,
        job_id: Uuid,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<SourceFile> {
        let file = source_file(job_id, original_name, &bytes)?;
        self.files
            .write()
            .await
            .insert(file.storage_key.clone(), bytes);
        Ok(file)
    }

    async fn read(&self, storage_key: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .read()
            .await
            .get(storage_key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("source file not found: {}", storage_key))
    }

    async fn delete(&self, storage_key: &str) -> anyhow::Result<()> {
        self.files.write().await.remove(storage_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_strips_directories() {
        let job_id = Uuid::new_v4();
        let upload_id = Uuid::new_v4();
        let prefix = format!("{job_id}/{}", upload_id.simple());
        assert_eq!(
            storage_key(job_id, upload_id, "../../etc/passwd"),
            format!("{prefix}-passwd")
        );
        assert_eq!(
            storage_key(job_id, upload_id, "spring catalog (v2).csv"),
            format!("{prefix}-spring_catalog__v2_.csv")
        );
        assert_eq!(
            storage_key(job_id, upload_id, ".."),
            format!("{prefix}-upload.csv")
        );
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let job_id = Uuid::new_v4();

        let file = storage
            .put(job_id, "products.csv", b"sku,name,price\n".to_vec())
            .await
            .unwrap();
        assert_eq!(file.original_name, "products.csv");
        assert_eq!(file.size_bytes, 15);
        assert_eq!(storage.read(&file.storage_key).await.unwrap(), b"sku,name,price\n");

        storage.delete(&file.storage_key).await.unwrap();
        assert!(storage.read(&file.storage_key).await.is_err());
        // 2 回目の削除もエラーにならない
        storage.delete(&file.storage_key).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        assert!(storage.read("../secret.csv").await.is_err());
        assert!(storage.read("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryFileStorage::new();
        let job_id = Uuid::new_v4();
        let file = storage
            .put(job_id, "a.csv", b"x".to_vec())
            .await
            .unwrap();
        assert!(storage.contains(&file.storage_key).await);
        let again = storage
            .put(job_id, "a.csv", b"y".to_vec())
            .await
            .unwrap();
        assert_ne!(again.storage_key, file.storage_key);
        storage.remove(&file.storage_key).await;
        let err = storage.read(&file.storage_key).await.unwrap_err();
        assert!(err.to_string().contains("source file not found"));
    }
}

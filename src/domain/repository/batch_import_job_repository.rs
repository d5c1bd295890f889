use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobStatus};
use crate::domain::entity::row_error::BatchImportRowError;

/// BatchImportListParams はジョブ一覧取得のパラメータ。
#[derive(Debug, Clone, Default)]
pub struct BatchImportListParams {
    pub status: Option<JobStatus>,
    pub page: i32,
    pub page_size: i32,
}

/// BatchImportJobRepository はジョブの進捗（チェックポイント）と行エラーを永続化するリポジトリトレイト。
/// 状態を書き換える操作はすべて期待する現在状態またはチェックポイントとの比較付きで行い、
/// 一致しなかった場合は false を返す。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchImportJobRepository: Send + Sync {
    /// 新しいジョブを作成する。
    async fn create(&self, job: &BatchImportJob) -> anyhow::Result<()>;

    /// IDでジョブを検索する。
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<BatchImportJob>>;

    /// ジョブ一覧を取得する（作成日時の降順）。
    async fn list(
        &self,
        params: &BatchImportListParams,
    ) -> anyhow::Result<(Vec<BatchImportJob>, i64)>;

    /// pending 状態で、保存済みのファイル参照のキーが previous_storage_key と一致する場合に限り、
    /// ファイル参照と総行数を書き込む。
    async fn attach_file(
        &self,
        job: &BatchImportJob,
        previous_storage_key: Option<String>,
    ) -> anyhow::Result<bool>;

    /// 現在状態が expected の場合に限り、状態・エラーメッセージ・完了日時を job の内容で更新する。
    async fn transition_status(
        &self,
        job: &BatchImportJob,
        expected: JobStatus,
    ) -> anyhow::Result<bool>;

    /// 1 行分の結果（カウンタ・チェックポイント・行エラー）を原子的に書き込む。
    /// 保存済みチェックポイントが expected_checkpoint と異なる場合は何も書かずに false を返す。
    async fn commit_row(
        &self,
        job: &BatchImportJob,
        expected_checkpoint: i64,
        errors: &[BatchImportRowError],
    ) -> anyhow::Result<bool>;

    /// 行エラーを行番号の昇順で取得する。
    async fn find_errors(&self, job_id: Uuid) -> anyhow::Result<Vec<BatchImportRowError>>;

    /// 現在状態が expected の場合に限り、ジョブと行エラーを削除する。
    async fn delete(&self, id: Uuid, expected: JobStatus) -> anyhow::Result<bool>;

    /// 指定状態のジョブを検索する（起動時リカバリ用）。
    async fn find_by_status(&self, status: JobStatus) -> anyhow::Result<Vec<BatchImportJob>>;
}

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::entity::batch_import_job::{BatchImportJob, JobAction, JobStatus};
use crate::domain::entity::catalog_schema::CatalogSchema;
use crate::domain::entity::row_error::BatchImportRowError;
use crate::domain::repository::{BatchImportJobRepository, CatalogRepository};
use crate::domain::service::csv_inspector::CsvFileInspector;
use crate::domain::service::row_validator::{FieldIssue, RowValidator};
use crate::infrastructure::file_storage::SourceFileStorage;
use crate::infrastructure::kafka_producer::{self, BatchEventPublisher};
use crate::infrastructure::product_applier::{ApplyError, ProductApplier};
use crate::usecase::execution_registry::ExecutionLease;

/// RunnerSettings はランナーのタイムアウトと失敗判定の設定。
#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub apply_timeout: Duration,
    /// 0 は無効。
    pub max_consecutive_apply_failures: u32,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            apply_timeout: Duration::from_secs(10),
            max_consecutive_apply_failures: 5,
        }
    }
}

/// RowOutcome は 1 行を処理した結果。
struct RowOutcome {
    succeeded: bool,
    errors: Vec<BatchImportRowError>,
    apply: ApplyResult,
}

/// 下流呼び出しの結果の分類（連続失敗の判定に使う）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyResult {
    NotAttempted,
    Applied,
    Rejected,
    Unavailable,
}

/// 1 回の実行の終わり方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// 行の間で停止し、リースは解放済み。
    Released,
    /// 完了・失敗などで処理を終えた。リースはまだ保持している。
    Finished,
}

/// ExecuteBatchUseCase はジョブのランナー。チェックポイントから行を順に処理し、
/// 1 行ごとに結果をコミットし、行の間でのみ制御シグナルを確認する。
pub struct ExecuteBatchUseCase {
    job_repo: Arc<dyn BatchImportJobRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    storage: Arc<dyn SourceFileStorage>,
    applier: Arc<dyn ProductApplier>,
    publisher: Option<Arc<dyn BatchEventPublisher>>,
    settings: RunnerSettings,
}

impl ExecuteBatchUseCase {
    pub fn new(
        job_repo: Arc<dyn BatchImportJobRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        storage: Arc<dyn SourceFileStorage>,
        applier: Arc<dyn ProductApplier>,
        publisher: Option<Arc<dyn BatchEventPublisher>>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            job_repo,
            catalog_repo,
            storage,
            applier,
            publisher,
            settings,
        }
    }

    /// ジョブを実行する。processing 以外の状態であれば何もしない。
    /// 終了処理の間に再開要求が届いた場合は、保存済みのチェックポイントから処理をやり直す。
    /// ストアの障害で中断した場合はジョブを failed にしてから戻る。
    pub async fn run(&self, job_id: Uuid, mut lease: ExecutionLease) -> anyhow::Result<()> {
        loop {
            let exit = match self.run_once(job_id, &mut lease).await {
                Ok(exit) => exit,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "batch import execution aborted");
                    self.fail_from_stored(job_id, format!("checkpoint store unavailable: {e}"))
                        .await;
                    Exit::Finished
                }
            };
            if exit == Exit::Released || lease.try_release() {
                return Ok(());
            }
            let signal = lease.take_signal();
            info!(
                job_id = %job_id,
                signal = ?signal,
                "control signal arrived while finishing, running again"
            );
        }
    }

    async fn run_once(&self, job_id: Uuid, lease: &mut ExecutionLease) -> anyhow::Result<Exit> {
        let mut job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("batch import job not found: {}", job_id))?;

        if job.status != JobStatus::Processing {
            info!(job_id = %job_id, status = %job.status, "job is not processing, nothing to run");
            return Ok(Exit::Finished);
        }

        let (schema, bytes) = match self.load_inputs(&job).await {
            Ok(inputs) => inputs,
            Err(reason) => {
                self.fail(&mut job, reason).await?;
                return Ok(Exit::Finished);
            }
        };

        let mut reader = CsvFileInspector::reader(&bytes);
        let headers = match CsvFileInspector::headers(&mut reader) {
            Ok(headers) => headers,
            Err(e) => {
                self.fail(&mut job, format!("source file header is unreadable: {e}"))
                    .await?;
                return Ok(Exit::Finished);
            }
        };

        let start = usize::try_from(job.checkpoint_row_index)?;
        info!(
            job_id = %job_id,
            checkpoint = job.checkpoint_row_index,
            total_rows = job.total_rows,
            "batch import execution started"
        );

        let mut consecutive_failures: u32 = 0;
        for record in reader.records().skip(start) {
            if self.should_stop(job_id, lease).await? {
                return Ok(Exit::Released);
            }

            let row_number = job.next_row_number();
            let outcome = match record {
                Ok(record) => {
                    let cells = headers.iter().map(String::as_str).zip(record.iter());
                    self.process_row(&job, &schema, row_number, cells).await
                }
                Err(e) => RowOutcome {
                    succeeded: false,
                    errors: vec![BatchImportRowError::row_level(
                        job_id,
                        row_number,
                        format!("malformed CSV row: {e}"),
                    )],
                    apply: ApplyResult::NotAttempted,
                },
            };

            match outcome.apply {
                ApplyResult::Unavailable => consecutive_failures += 1,
                ApplyResult::Applied | ApplyResult::Rejected => consecutive_failures = 0,
                ApplyResult::NotAttempted => {}
            }

            let expected_checkpoint = job.checkpoint_row_index;
            job.record_row(outcome.succeeded);
            if !self
                .job_repo
                .commit_row(&job, expected_checkpoint, &outcome.errors)
                .await?
            {
                warn!(
                    job_id = %job_id,
                    row = row_number,
                    "checkpoint was moved by another execution, stopping"
                );
                return Ok(Exit::Finished);
            }
            debug!(
                job_id = %job_id,
                row = row_number,
                succeeded = outcome.succeeded,
                errors = outcome.errors.len(),
                "row committed"
            );

            let limit = self.settings.max_consecutive_apply_failures;
            if limit > 0 && consecutive_failures >= limit {
                let reason =
                    format!("{consecutive_failures} consecutive product apply failures");
                self.fail(&mut job, reason).await?;
                return Ok(Exit::Finished);
            }
        }

        self.complete(&mut job).await?;
        Ok(Exit::Finished)
    }

    /// カタログスキーマとファイル内容を読み込む。失敗は回復不能な条件として理由を返す。
    async fn load_inputs(&self, job: &BatchImportJob) -> Result<(CatalogSchema, Vec<u8>), String> {
        let schema = match self.catalog_repo.find_schema(job.catalog_id).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                return Err(format!(
                    "catalog not found: {}",
                    job.catalog_id.map(|id| id.to_string()).unwrap_or_default()
                ))
            }
            Err(e) => return Err(format!("catalog lookup failed: {e}")),
        };
        let Some(file) = job.source_file.as_ref() else {
            return Err("job has no source file".to_string());
        };
        let bytes = self
            .storage
            .read(&file.storage_key)
            .await
            .map_err(|e| format!("source file is unreadable: {e}"))?;
        Ok((schema, bytes))
    }

    /// 1 行を検証し、有効であれば商品を作成する。
    async fn process_row<'a>(
        &self,
        job: &BatchImportJob,
        schema: &CatalogSchema,
        row_number: i64,
        cells: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> RowOutcome {
        let to_errors = |issues: Vec<FieldIssue>| {
            issues
                .into_iter()
                .map(|i| BatchImportRowError::new(job.id, row_number, i.field, i.message, i.severity))
                .collect::<Vec<_>>()
        };

        let validated = match RowValidator::validate(schema, cells) {
            Ok(validated) => validated,
            Err(issues) => {
                return RowOutcome {
                    succeeded: false,
                    errors: to_errors(issues),
                    apply: ApplyResult::NotAttempted,
                }
            }
        };

        let mut errors = to_errors(validated.warnings);
        let idempotency_key = format!("{}:{}", job.id, row_number);
        let applied = tokio::time::timeout(
            self.settings.apply_timeout,
            self.applier.apply(&validated.command, &idempotency_key),
        )
        .await;

        let (succeeded, apply, failure) = match applied {
            Ok(Ok(_)) => (true, ApplyResult::Applied, None),
            Ok(Err(e @ ApplyError::Rejected(_))) => (false, ApplyResult::Rejected, Some(e.to_string())),
            Ok(Err(e @ ApplyError::Unavailable(_))) => {
                (false, ApplyResult::Unavailable, Some(e.to_string()))
            }
            Err(_) => (
                false,
                ApplyResult::Unavailable,
                Some(format!(
                    "product apply timed out after {} ms",
                    self.settings.apply_timeout.as_millis()
                )),
            ),
        };
        if let Some(message) = failure {
            errors.push(BatchImportRowError::row_level(job.id, row_number, message));
        }

        RowOutcome {
            succeeded,
            errors,
            apply,
        }
    }

    /// 行の間の安全点で制御シグナルを確認する。永続化された状態が processing のままなら
    /// 古いシグナルとみなして処理を続ける。
    async fn should_stop(&self, job_id: Uuid, lease: &mut ExecutionLease) -> anyhow::Result<bool> {
        while let Some(signal) = lease.take_signal() {
            let status = self
                .job_repo
                .find_by_id(job_id)
                .await?
                .map(|j| j.status);
            if status == Some(JobStatus::Processing) {
                debug!(job_id = %job_id, signal = %signal, "job is still processing, continuing");
                continue;
            }
            if lease.try_release() {
                info!(
                    job_id = %job_id,
                    signal = %signal,
                    status = ?status,
                    "batch import execution stopped between rows"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn complete(&self, job: &mut BatchImportJob) -> anyhow::Result<()> {
        let previous = job.transition(JobAction::Complete)?;
        if !self.job_repo.transition_status(job, previous).await? {
            info!(job_id = %job.id, "job left processing before completion, leaving its state");
            return Ok(());
        }
        info!(
            job_id = %job.id,
            success_rows = job.success_rows,
            error_rows = job.error_rows,
            "batch import completed"
        );
        kafka_producer::notify(
            self.publisher.as_ref(),
            job.id,
            kafka_producer::BATCH_COMPLETED,
            serde_json::json!({
                "total_rows": job.total_rows,
                "success_rows": job.success_rows,
                "error_rows": job.error_rows,
            }),
        )
        .await;
        Ok(())
    }

    /// processing から failed に遷移する。既に別の状態であれば何もしない。
    async fn fail(&self, job: &mut BatchImportJob, reason: String) -> anyhow::Result<()> {
        let previous = job.fail(reason.clone())?;
        if !self.job_repo.transition_status(job, previous).await? {
            info!(job_id = %job.id, "job left processing before it could be failed");
            return Ok(());
        }
        error!(
            job_id = %job.id,
            checkpoint = job.checkpoint_row_index,
            reason = %reason,
            "batch import failed"
        );
        kafka_producer::notify(
            self.publisher.as_ref(),
            job.id,
            kafka_producer::BATCH_FAILED,
            serde_json::json!({
                "reason": reason,
                "checkpoint_row_index": job.checkpoint_row_index,
            }),
        )
        .await;
        Ok(())
    }

    /// 保存済みの状態を読み直してから failed にする。失敗はログに残すのみ。
    async fn fail_from_stored(&self, job_id: Uuid, reason: String) {
        let result = async {
            if let Some(mut stored) = self.job_repo.find_by_id(job_id).await? {
                if stored.status == JobStatus::Processing {
                    self.fail(&mut stored, reason).await?;
                }
            }
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = result {
            error!(job_id = %job_id, error = %e, "failed to mark job as failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::repository::batch_import_in_memory::InMemoryBatchImportRepository;
    use crate::adapter::repository::catalog_in_memory::InMemoryCatalogRepository;
    use crate::domain::entity::product_command::AppliedProduct;
    use crate::domain::repository::batch_import_job_repository::MockBatchImportJobRepository;
    use crate::infrastructure::file_storage::InMemoryFileStorage;
    use crate::infrastructure::product_applier::MockProductApplier;
    use crate::usecase::execution_registry::{ControlSignal, ExecutionRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixture {
        repo: Arc<InMemoryBatchImportRepository>,
        storage: Arc<InMemoryFileStorage>,
        registry: Arc<ExecutionRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                repo: Arc::new(InMemoryBatchImportRepository::new()),
                storage: Arc::new(InMemoryFileStorage::new()),
                registry: Arc::new(ExecutionRegistry::new()),
            }
        }

        fn runner(&self, applier: MockProductApplier, settings: RunnerSettings) -> ExecuteBatchUseCase {
            ExecuteBatchUseCase::new(
                self.repo.clone(),
                Arc::new(InMemoryCatalogRepository::new()),
                self.storage.clone(),
                Arc::new(applier),
                None,
                settings,
            )
        }

        async fn processing_job(&self, csv: &str) -> BatchImportJob {
            let mut job = BatchImportJob::new("runner".to_string(), None, None);
            let file = self
                .storage
                .put(job.id, "p.csv", csv.as_bytes().to_vec())
                .await
                .unwrap();
            let total = i64::try_from(csv.lines().count() - 1).unwrap();
            job.attach_file(file, total).unwrap();
            job.transition(JobAction::Start).unwrap();
            self.repo.create(&job).await.unwrap();
            job
        }

        fn runner_with_repo(
            &self,
            repo: MockBatchImportJobRepository,
            applier: MockProductApplier,
        ) -> ExecuteBatchUseCase {
            ExecuteBatchUseCase::new(
                Arc::new(repo),
                Arc::new(InMemoryCatalogRepository::new()),
                self.storage.clone(),
                Arc::new(applier),
                None,
                RunnerSettings::default(),
            )
        }

        async fn stored(&self, id: Uuid) -> BatchImportJob {
            self.repo.find_by_id(id).await.unwrap().unwrap()
        }
    }

    const CSV: &str = "sku,name,price\nA-1,Shirt,10\nA-2,,5\nA-3,Hat,abc\nA-4,Cap,7.5\n";

    #[tokio::test]
    async fn test_run_completes_and_records_errors() {
        let fx = Fixture::new();
        let job = fx.processing_job(CSV).await;

        let mut applier = MockProductApplier::new();
        applier
            .expect_apply()
            .times(2)
            .returning(|_, _| Ok(AppliedProduct::default()));

        let runner = fx.runner(applier, RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();

        let stored = fx.stored(job.id).await;
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.processed_rows, 4);
        assert_eq!(stored.success_rows, 2);
        assert_eq!(stored.error_rows, 2);
        assert_eq!(stored.checkpoint_row_index, 4);
        assert!(stored.completed_at.is_some());

        let errors = fx.repo.find_errors(job.id).await.unwrap();
        let fields: Vec<_> = errors
            .iter()
            .map(|e| (e.row_number, e.field.as_deref()))
            .collect();
        assert_eq!(fields, vec![(2, Some("name")), (3, Some("price"))]);
        assert!(!fx.registry.is_active(job.id));
    }

    #[tokio::test]
    async fn test_idempotency_key_is_job_and_row() {
        let fx = Fixture::new();
        let job = fx.processing_job("sku,name,price\nA-1,Shirt,10\n").await;
        let expected = format!("{}:1", job.id);

        let mut applier = MockProductApplier::new();
        applier
            .expect_apply()
            .withf(move |cmd, key| cmd.sku == "A-1" && key.to_string() == expected)
            .times(1)
            .returning(|_, _| Ok(AppliedProduct::default()));

        let runner = fx.runner(applier, RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();
        assert_eq!(fx.stored(job.id).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_rejected_row_is_recorded_and_processing_continues() {
        let fx = Fixture::new();
        let job = fx.processing_job("sku,name,price\nDUP,Shirt,10\nA-2,Hat,5\n").await;

        let mut applier = MockProductApplier::new();
        applier.expect_apply().times(2).returning(|cmd, _| {
            if cmd.sku == "DUP" {
                Err(ApplyError::Rejected("sku already exists".to_string()))
            } else {
                Ok(AppliedProduct::default())
            }
        });

        let runner = fx.runner(applier, RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();

        let stored = fx.stored(job.id).await;
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.success_rows, 1);
        assert_eq!(stored.error_rows, 1);
        let errors = fx.repo.find_errors(job.id).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.is_none());
        assert!(errors[0].message.contains("sku already exists"));
    }

    #[tokio::test]
    async fn test_consecutive_unavailable_fails_job() {
        let fx = Fixture::new();
        let job = fx
            .processing_job("sku,name,price\nA,a,1\nB,b,1\nC,c,1\nD,d,1\n")
            .await;

        let mut applier = MockProductApplier::new();
        applier
            .expect_apply()
            .times(2)
            .returning(|_, _| Err(ApplyError::Unavailable("503".to_string())));

        let settings = RunnerSettings {
            apply_timeout: Duration::from_secs(1),
            max_consecutive_apply_failures: 2,
        };
        let runner = fx.runner(applier, settings);
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();

        let stored = fx.stored(job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.checkpoint_row_index, 2);
        assert_eq!(stored.error_rows, 2);
        assert!(stored.is_resumable());
        assert!(stored
            .error_message
            .as_deref()
            .unwrap()
            .contains("2 consecutive product apply failures"));
    }

    #[tokio::test]
    async fn test_missing_source_file_fails_job() {
        let fx = Fixture::new();
        let job = fx.processing_job(CSV).await;
        fx.storage
            .remove(&job.source_file.as_ref().unwrap().storage_key)
            .await;

        let runner = fx.runner(MockProductApplier::new(), RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();

        let stored = fx.stored(job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.processed_rows, 0);
        assert!(stored
            .error_message
            .as_deref()
            .unwrap()
            .contains("source file is unreadable"));
    }

    #[tokio::test]
    async fn test_run_resumes_after_checkpoint() {
        let fx = Fixture::new();
        let mut job = fx.processing_job(CSV).await;
        job.record_row(true);
        assert!(fx.repo.commit_row(&job, 0, &[]).await.unwrap());

        let mut applier = MockProductApplier::new();
        applier
            .expect_apply()
            .withf(|cmd, _| cmd.sku != "A-1")
            .times(1)
            .returning(|_, _| Ok(AppliedProduct::default()));

        let runner = fx.runner(applier, RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();

        let stored = fx.stored(job.id).await;
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.processed_rows, 4);
        assert_eq!(stored.success_rows, 2);
    }

    #[tokio::test]
    async fn test_run_ignores_job_not_processing() {
        let fx = Fixture::new();
        let job = BatchImportJob::new("idle".to_string(), None, None);
        fx.repo.create(&job).await.unwrap();

        let runner = fx.runner(MockProductApplier::new(), RunnerSettings::default());
        let lease = fx.registry.begin_or_continue(job.id).unwrap();
        runner.run(job.id, lease).await.unwrap();
        assert_eq!(fx.stored(job.id).await.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_status_read_error_between_rows_fails_job() {
        let fx = Fixture::new();
        let job = fx.processing_job(CSV).await;
        let job_id = job.id;

        let mut repo = MockBatchImportJobRepository::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let snapshot = job.clone();
        repo.expect_find_by_id().returning(move |_| {
            // 2 回目（1 行目の後のシグナル確認）だけ失敗させる
            if reads.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(anyhow::anyhow!("connection reset by peer"))
            } else {
                Ok(Some(snapshot.clone()))
            }
        });
        repo.expect_commit_row().times(1).returning(|_, _, _| Ok(true));
        repo.expect_transition_status()
            .withf(|job, expected| {
                job.status == JobStatus::Failed
                    && *expected == JobStatus::Processing
                    && job
                        .error_message
                        .as_deref()
                        .is_some_and(|m| m.contains("checkpoint store unavailable"))
            })
            .times(1)
            .returning(|_, _| Ok(true));

        let registry = fx.registry.clone();
        let mut applier = MockProductApplier::new();
        applier.expect_apply().times(1).returning(move |_, _| {
            registry.signal(job_id, ControlSignal::Pause);
            Ok(AppliedProduct::default())
        });

        let runner = fx.runner_with_repo(repo, applier);
        let lease = fx.registry.begin_or_continue(job_id).unwrap();
        runner.run(job_id, lease).await.unwrap();
        assert!(!fx.registry.is_active(job_id));
    }

    #[tokio::test]
    async fn test_completion_write_error_fails_job() {
        let fx = Fixture::new();
        let job = fx.processing_job("sku,name,price\nA-1,Shirt,10\n").await;
        let job_id = job.id;

        let mut repo = MockBatchImportJobRepository::new();
        let snapshot = job.clone();
        repo.expect_find_by_id()
            .times(2)
            .returning(move |_| Ok(Some(snapshot.clone())));
        repo.expect_commit_row().times(1).returning(|_, _, _| Ok(true));
        let written = Arc::new(Mutex::new(Vec::new()));
        let seen = written.clone();
        repo.expect_transition_status()
            .times(2)
            .returning(move |job, _| {
                seen.lock().unwrap().push(job.status);
                if job.status == JobStatus::Completed {
                    Err(anyhow::anyhow!("database is shutting down"))
                } else {
                    Ok(true)
                }
            });

        let mut applier = MockProductApplier::new();
        applier
            .expect_apply()
            .times(1)
            .returning(|_, _| Ok(AppliedProduct::default()));

        let runner = fx.runner_with_repo(repo, applier);
        let lease = fx.registry.begin_or_continue(job_id).unwrap();
        runner.run(job_id, lease).await.unwrap();

        assert_eq!(
            *written.lock().unwrap(),
            vec![JobStatus::Completed, JobStatus::Failed]
        );
        assert!(!fx.registry.is_active(job_id));
    }
}

//! テスト用のインメモリ構成とヘルパー。
//! ユニットテストと統合テスト（tests/）から利用する。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::adapter::handler::AppState;
use crate::domain::entity::batch_import_job::{BatchImportJob, JobStatus};
use crate::domain::entity::product_command::{AppliedProduct, CreateProductCommand};
use crate::domain::repository::BatchImportJobRepository;
use crate::domain::service::csv_inspector::FileLimits;
use crate::infrastructure::kafka_producer::BatchEventPublisher;
use crate::infrastructure::product_applier::{ApplyError, ProductApplier};
use crate::usecase::{
    AttachFileUseCase, BatchScheduler, CancelBatchUseCase, CreateBatchUseCase,
    DeleteBatchUseCase, ExecuteBatchUseCase, ExecutionRegistry, GenerateTemplateUseCase,
    GetBatchErrorsUseCase, GetBatchUseCase, ListBatchesUseCase, PauseBatchUseCase,
    RecoverBatchesUseCase, ResumeBatchUseCase, RetryBatchUseCase, RunnerSettings,
    StartBatchUseCase,
};

pub use crate::adapter::repository::batch_import_in_memory::InMemoryBatchImportRepository;
pub use crate::adapter::repository::catalog_in_memory::InMemoryCatalogRepository;
pub use crate::infrastructure::file_storage::InMemoryFileStorage;

// ---------------------------------------------------------------------------
// RecordingProductApplier
// ---------------------------------------------------------------------------

struct Hold {
    row_number: i64,
    reached: Notify,
    release: Notify,
}

/// 呼び出しを記録する ProductApplier。遅延・拒否・停止位置を設定できる。
#[derive(Default)]
pub struct RecordingProductApplier {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    rejected_skus: Vec<String>,
    unavailable: bool,
    hold: Option<Hold>,
}

impl RecordingProductApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 応答を返すまで待つ時間を設定する。
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 指定した SKU を下流で拒否されたものとして扱う。
    #[must_use]
    pub fn rejecting(mut self, sku: &str) -> Self {
        self.rejected_skus.push(sku.to_string());
        self
    }

    /// すべての呼び出しを Unavailable にする。
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// 指定行の呼び出しで `release_hold` まで応答を止める。
    #[must_use]
    pub fn holding_at(mut self, row_number: i64) -> Self {
        self.hold = Some(Hold {
            row_number,
            reached: Notify::new(),
            release: Notify::new(),
        });
        self
    }

    /// 記録済みの冪等キー（`{job_id}:{row_number}`）を呼び出し順に返す。
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 指定ジョブについて呼び出された行番号を呼び出し順に返す。
    pub fn rows_for(&self, job_id: Uuid) -> Vec<i64> {
        let prefix = format!("{job_id}:");
        self.calls()
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.parse().ok())
            .collect()
    }

    /// 停止位置の行に到達するまで待つ。
    pub async fn wait_until_held(&self) {
        if let Some(hold) = &self.hold {
            hold.reached.notified().await;
        }
    }

    pub fn release_hold(&self) {
        if let Some(hold) = &self.hold {
            hold.release.notify_one();
        }
    }
}

#[async_trait]
impl ProductApplier for RecordingProductApplier {
    async fn apply(
        &self,
        command: &CreateProductCommand,
        idempotency_key: &str,
    ) -> Result<AppliedProduct, ApplyError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(idempotency_key.to_string());

        if let Some(hold) = &self.hold {
            let row = idempotency_key
                .rsplit(':')
                .next()
                .and_then(|r| r.parse::<i64>().ok());
            if row == Some(hold.row_number) {
                hold.reached.notify_one();
                hold.release.notified().await;
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable {
            return Err(ApplyError::Unavailable("503 Service Unavailable".to_string()));
        }
        if self.rejected_skus.contains(&command.sku) {
            return Err(ApplyError::Rejected(format!(
                "sku {} already exists",
                command.sku
            )));
        }
        Ok(AppliedProduct {
            product_id: Some(Uuid::new_v4().to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

struct EventHold {
    event_type: String,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

/// 発行されたイベントを記録する BatchEventPublisher。
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(Uuid, String)>>,
    hold: Option<EventHold>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定種別のイベントを最初に発行したとき、記録した後 `release_hold` まで戻らない。
    #[must_use]
    pub fn holding_on(mut self, event_type: &str) -> Self {
        self.hold = Some(EventHold {
            event_type: event_type.to_string(),
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        });
        self
    }

    pub async fn wait_until_held(&self) {
        if let Some(hold) = &self.hold {
            hold.reached.notified().await;
        }
    }

    pub fn release_hold(&self) {
        if let Some(hold) = &self.hold {
            hold.release.notify_one();
        }
    }

    /// 指定ジョブのイベント種別を発行順に返す。
    pub fn event_types(&self, job_id: Uuid) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, event_type)| event_type.clone())
            .collect()
    }
}

#[async_trait]
impl BatchEventPublisher for RecordingPublisher {
    async fn publish_batch_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        _payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job_id, event_type.to_string()));

        if let Some(hold) = &self.hold {
            if hold.event_type == event_type && hold.armed.swap(false, Ordering::SeqCst) {
                hold.reached.notify_one();
                hold.release.notified().await;
            }
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestContext
// ---------------------------------------------------------------------------

/// インメモリ実装で組み立てたパイプライン一式。
pub struct TestContext {
    pub job_repo: Arc<InMemoryBatchImportRepository>,
    pub catalog_repo: Arc<InMemoryCatalogRepository>,
    pub storage: Arc<InMemoryFileStorage>,
    pub applier: Arc<RecordingProductApplier>,
    pub publisher: Arc<RecordingPublisher>,
    pub scheduler: Arc<BatchScheduler>,
    pub limits: FileLimits,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_applier(RecordingProductApplier::new(), RunnerSettings::default())
    }

    pub fn with_applier(applier: RecordingProductApplier, settings: RunnerSettings) -> Self {
        Self::with_parts(applier, RecordingPublisher::new(), settings)
    }

    pub fn with_parts(
        applier: RecordingProductApplier,
        publisher: RecordingPublisher,
        settings: RunnerSettings,
    ) -> Self {
        let job_repo = Arc::new(InMemoryBatchImportRepository::new());
        let catalog_repo = Arc::new(InMemoryCatalogRepository::new());
        let storage = Arc::new(InMemoryFileStorage::new());
        let applier = Arc::new(applier);
        let publisher = Arc::new(publisher);

        let execute_uc = Arc::new(ExecuteBatchUseCase::new(
            job_repo.clone(),
            catalog_repo.clone(),
            storage.clone(),
            applier.clone(),
            Some(publisher.clone() as Arc<dyn BatchEventPublisher>),
            settings,
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            Arc::new(ExecutionRegistry::new()),
            execute_uc,
        ));

        Self {
            job_repo,
            catalog_repo,
            storage,
            applier,
            publisher,
            scheduler,
            limits: FileLimits {
                max_bytes: 10 * 1024 * 1024,
                max_rows: 100_000,
            },
        }
    }

    fn publisher(&self) -> Option<Arc<dyn BatchEventPublisher>> {
        Some(self.publisher.clone() as Arc<dyn BatchEventPublisher>)
    }

    pub fn create_batch_uc(&self) -> CreateBatchUseCase {
        CreateBatchUseCase::new(
            self.job_repo.clone(),
            self.catalog_repo.clone(),
            self.publisher(),
        )
    }

    pub fn attach_file_uc(&self) -> AttachFileUseCase {
        AttachFileUseCase::new(
            self.job_repo.clone(),
            self.catalog_repo.clone(),
            self.storage.clone(),
            self.publisher(),
            self.limits,
        )
    }

    pub fn start_batch_uc(&self) -> StartBatchUseCase {
        StartBatchUseCase::new(self.job_repo.clone(), self.scheduler.clone(), self.publisher())
    }

    pub fn pause_batch_uc(&self) -> PauseBatchUseCase {
        PauseBatchUseCase::new(self.job_repo.clone(), self.scheduler.clone(), self.publisher())
    }

    pub fn resume_batch_uc(&self) -> ResumeBatchUseCase {
        ResumeBatchUseCase::new(self.job_repo.clone(), self.scheduler.clone(), self.publisher())
    }

    pub fn cancel_batch_uc(&self) -> CancelBatchUseCase {
        CancelBatchUseCase::new(self.job_repo.clone(), self.scheduler.clone(), self.publisher())
    }

    pub fn retry_batch_uc(&self) -> RetryBatchUseCase {
        RetryBatchUseCase::new(self.job_repo.clone(), self.scheduler.clone(), self.publisher())
    }

    pub fn delete_batch_uc(&self) -> DeleteBatchUseCase {
        DeleteBatchUseCase::new(self.job_repo.clone(), self.storage.clone(), self.publisher())
    }

    pub fn recover_batches_uc(&self) -> RecoverBatchesUseCase {
        RecoverBatchesUseCase::new(self.job_repo.clone(), self.scheduler.clone())
    }

    /// REST ハンドラー用の AppState を構築する。
    pub fn app_state(&self) -> AppState {
        AppState {
            create_batch_uc: Arc::new(self.create_batch_uc()),
            attach_file_uc: Arc::new(self.attach_file_uc()),
            start_batch_uc: Arc::new(self.start_batch_uc()),
            pause_batch_uc: Arc::new(self.pause_batch_uc()),
            resume_batch_uc: Arc::new(self.resume_batch_uc()),
            cancel_batch_uc: Arc::new(self.cancel_batch_uc()),
            retry_batch_uc: Arc::new(self.retry_batch_uc()),
            delete_batch_uc: Arc::new(self.delete_batch_uc()),
            get_batch_uc: Arc::new(GetBatchUseCase::new(self.job_repo.clone())),
            get_batch_errors_uc: Arc::new(GetBatchErrorsUseCase::new(self.job_repo.clone())),
            list_batches_uc: Arc::new(ListBatchesUseCase::new(self.job_repo.clone())),
            generate_template_uc: Arc::new(GenerateTemplateUseCase::new(
                self.catalog_repo.clone(),
            )),
            max_upload_bytes: self.limits.max_bytes,
        }
    }

    /// ジョブを作成して CSV を添付する。
    pub async fn create_job_with_file(&self, csv: &str) -> anyhow::Result<BatchImportJob> {
        let job = self
            .create_batch_uc()
            .execute(crate::usecase::CreateBatchInput {
                name: "test import".to_string(),
                description: None,
                catalog_id: None,
            })
            .await?;
        Ok(self
            .attach_file_uc()
            .execute(job.id, "products.csv", csv.as_bytes().to_vec())
            .await?)
    }

    /// ジョブが指定状態になり、ランナーが停止するまで待つ。
    pub async fn wait_for_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
    ) -> anyhow::Result<BatchImportJob> {
        for _ in 0..500 {
            if let Some(job) = self.job_repo.find_by_id(job_id).await? {
                if job.status == status && !self.scheduler.is_running(job_id) {
                    return Ok(job);
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("job {} did not reach {} in time", job_id, status)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// テスト用 AppState と、状態確認用のコンテキストを返す。
pub fn make_test_app_state() -> (AppState, TestContext) {
    let ctx = TestContext::new();
    (ctx.app_state(), ctx)
}

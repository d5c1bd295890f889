use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::usecase::execute_batch::ExecuteBatchUseCase;
use crate::usecase::execution_registry::{ControlSignal, ExecutionRegistry};

/// BatchScheduler はランナーをバックグラウンドタスクとして起動し、実行中のランナーに制御シグナルを届ける。
pub struct BatchScheduler {
    registry: Arc<ExecutionRegistry>,
    execute_uc: Arc<ExecuteBatchUseCase>,
}

impl BatchScheduler {
    pub fn new(registry: Arc<ExecutionRegistry>, execute_uc: Arc<ExecuteBatchUseCase>) -> Self {
        Self {
            registry,
            execute_uc,
        }
    }

    /// ジョブの実行を開始する。既にランナーが動いている場合はそのまま続行させ、None を返す。
    pub fn schedule(&self, job_id: Uuid) -> Option<JoinHandle<()>> {
        let Some(lease) = self.registry.begin_or_continue(job_id) else {
            debug!(job_id = %job_id, "runner already active, continuing it");
            return None;
        };

        let execute_uc = self.execute_uc.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = execute_uc.run(job_id, lease).await {
                error!(job_id = %job_id, error = %e, "batch import execution failed");
            }
        }))
    }

    /// 実行中のランナーにシグナルを送る。ランナーが無ければ false。
    pub fn signal(&self, job_id: Uuid, signal: ControlSignal) -> bool {
        self.registry.signal(job_id, signal)
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.registry.is_active(job_id)
    }
}

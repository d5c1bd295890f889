use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JobStatus はバッチインポートジョブのライフサイクル状態を表す。
/// `retrying` は failed → processing 遷移上の一時的なラベルであり、永続化される状態ではない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => anyhow::bail!("invalid batch import status: {}", s),
        }
    }

    /// 終端状態（completed / cancelled）かどうかを返す。
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// 遷移表に従って次の状態を返す。表にない組み合わせは InvalidStateTransition。
    pub fn next(self, action: JobAction) -> Result<JobStatus, TransitionError> {
        use JobAction as A;
        use JobStatus as S;

        let next = match (self, action) {
            (S::Pending, A::AttachFile) => Some(S::Pending),
            (S::Pending, A::Start) => Some(S::Processing),
            (S::Processing, A::Complete) => Some(S::Completed),
            (S::Processing, A::Fail) => Some(S::Failed),
            (S::Processing, A::Pause) => Some(S::Paused),
            (S::Paused, A::Resume) | (S::Failed, A::Retry) => Some(S::Processing),
            (S::Pending | S::Processing | S::Paused | S::Failed, A::Cancel) => Some(S::Cancelled),
            (S::Pending | S::Completed | S::Cancelled, A::Delete) => Some(self),
            _ => None,
        };

        next.ok_or(TransitionError::InvalidStateTransition {
            current: self,
            action,
        })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// JobAction は状態遷移を引き起こすイベント。Complete / Fail はランナーのみが発行する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    AttachFile,
    Start,
    Pause,
    Resume,
    Cancel,
    Retry,
    Delete,
    Complete,
    Fail,
}

impl JobAction {
    pub const ALL: [JobAction; 9] = [
        Self::AttachFile,
        Self::Start,
        Self::Pause,
        Self::Resume,
        Self::Cancel,
        Self::Retry,
        Self::Delete,
        Self::Complete,
        Self::Fail,
    ];
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttachFile => write!(f, "attach_file"),
            Self::Start => write!(f, "start"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Cancel => write!(f, "cancel"),
            Self::Retry => write!(f, "retry"),
            Self::Delete => write!(f, "delete"),
            Self::Complete => write!(f, "complete"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// TransitionError は状態遷移ガードの違反を表す。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid state transition: cannot {action} a job in {current} state")]
    InvalidStateTransition { current: JobStatus, action: JobAction },

    #[error("a source file must be attached before the job can {0}")]
    SourceFileMissing(JobAction),

    #[error("checkpoint {checkpoint} is not valid for a file of {total_rows} rows")]
    CheckpointInvalid { checkpoint: i64, total_rows: i64 },
}

/// SourceFile はアップロードされた CSV の参照（元ファイル名とストレージハンドル）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub original_name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
}

/// BatchImportJob はバッチインポートジョブの進捗とライフサイクルを保持する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportJob {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub catalog_id: Option<Uuid>,
    pub status: JobStatus,
    pub source_file: Option<SourceFile>,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub success_rows: i64,
    pub error_rows: i64,
    /// コミット済みデータ行数。最後にコミットした行の 1 始まりの行番号と一致し、再開位置となる。
    pub checkpoint_row_index: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchImportJob {
    pub fn new(name: String, description: Option<String>, catalog_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            catalog_id,
            status: JobStatus::Pending,
            source_file: None,
            total_rows: 0,
            processed_rows: 0,
            success_rows: 0,
            error_rows: 0,
            checkpoint_row_index: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// ファイルを添付する。pending 状態でのみ許可され、既存の添付は置き換える。
    pub fn attach_file(&mut self, file: SourceFile, total_rows: i64) -> Result<(), TransitionError> {
        self.status.next(JobAction::AttachFile)?;
        self.source_file = Some(file);
        self.total_rows = total_rows;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// ガード条件を含めて遷移を適用し、遷移前の状態を返す。
    pub fn transition(&mut self, action: JobAction) -> Result<JobStatus, TransitionError> {
        let next = self.status.next(action)?;

        match action {
            JobAction::Start if self.source_file.is_none() => {
                return Err(TransitionError::SourceFileMissing(action));
            }
            JobAction::Resume | JobAction::Retry if !self.has_valid_checkpoint() => {
                return Err(TransitionError::CheckpointInvalid {
                    checkpoint: self.checkpoint_row_index,
                    total_rows: self.total_rows,
                });
            }
            _ => {}
        }

        let previous = self.status;
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        match action {
            JobAction::Resume | JobAction::Retry => self.error_message = None,
            JobAction::Complete => self.completed_at = Some(now),
            _ => {}
        }
        Ok(previous)
    }

    /// 失敗理由を付けて failed に遷移する。
    pub fn fail(&mut self, reason: String) -> Result<JobStatus, TransitionError> {
        let previous = self.transition(JobAction::Fail)?;
        self.error_message = Some(reason);
        Ok(previous)
    }

    /// 1 行分の結果をカウンタとチェックポイントに反映する。
    pub fn record_row(&mut self, succeeded: bool) {
        self.processed_rows += 1;
        if succeeded {
            self.success_rows += 1;
        } else {
            self.error_rows += 1;
        }
        self.checkpoint_row_index += 1;
        self.updated_at = Utc::now();
    }

    /// 次に処理すべき行番号（1 始まり）。
    pub fn next_row_number(&self) -> i64 {
        self.checkpoint_row_index + 1
    }

    pub fn has_valid_checkpoint(&self) -> bool {
        self.source_file.is_some()
            && self.checkpoint_row_index >= 0
            && self.checkpoint_row_index <= self.total_rows
    }

    /// 途中停止しており、チェックポイントから再開可能かどうか。
    pub fn is_resumable(&self) -> bool {
        match self.status {
            JobStatus::Paused | JobStatus::Failed => self.has_valid_checkpoint(),
            _ => false,
        }
    }

    /// processed == success + error と checkpoint <= total を満たすかどうか。
    pub fn counters_consistent(&self) -> bool {
        self.processed_rows == self.success_rows + self.error_rows
            && self.checkpoint_row_index <= self.total_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> SourceFile {
        SourceFile {
            original_name: "products.csv".to_string(),
            storage_key: "jobs/abc/products.csv".to_string(),
            size_bytes: 128,
            checksum_sha256: "deadbeef".to_string(),
        }
    }

    fn job_with_file(total_rows: i64) -> BatchImportJob {
        let mut job = BatchImportJob::new("spring catalog".to_string(), None, None);
        job.attach_file(sample_file(), total_rows).unwrap();
        job
    }

    /// 許可される (状態, イベント) → 次状態 の完全な表。
    fn allowed(status: JobStatus, action: JobAction) -> Option<JobStatus> {
        use JobAction as A;
        use JobStatus as S;
        match (status, action) {
            (S::Pending, A::AttachFile) => Some(S::Pending),
            (S::Pending, A::Start) => Some(S::Processing),
            (S::Pending, A::Cancel) => Some(S::Cancelled),
            (S::Pending, A::Delete) => Some(S::Pending),
            (S::Processing, A::Complete) => Some(S::Completed),
            (S::Processing, A::Fail) => Some(S::Failed),
            (S::Processing, A::Pause) => Some(S::Paused),
            (S::Processing, A::Cancel) => Some(S::Cancelled),
            (S::Paused, A::Resume) => Some(S::Processing),
            (S::Paused, A::Cancel) => Some(S::Cancelled),
            (S::Failed, A::Retry) => Some(S::Processing),
            (S::Failed, A::Cancel) => Some(S::Cancelled),
            (S::Completed, A::Delete) => Some(S::Completed),
            (S::Cancelled, A::Delete) => Some(S::Cancelled),
            _ => None,
        }
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        for status in JobStatus::ALL {
            for action in JobAction::ALL {
                let result = status.next(action);
                match allowed(status, action) {
                    Some(expected) => assert_eq!(result, Ok(expected), "{status} + {action}"),
                    None => assert_eq!(
                        result,
                        Err(TransitionError::InvalidStateTransition {
                            current: status,
                            action
                        }),
                        "{status} + {action}"
                    ),
                }
            }
        }
    }

    #[test]
    fn test_new_job_is_pending_without_file() {
        let job = BatchImportJob::new("import".to_string(), Some("desc".to_string()), None);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.source_file.is_none());
        assert_eq!(job.checkpoint_row_index, 0);
        assert!(job.counters_consistent());
        assert!(!job.is_resumable());
    }

    #[test]
    fn test_start_requires_file() {
        let mut job = BatchImportJob::new("import".to_string(), None, None);
        assert_eq!(
            job.transition(JobAction::Start),
            Err(TransitionError::SourceFileMissing(JobAction::Start))
        );
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_start_with_file() {
        let mut job = job_with_file(3);
        let previous = job.transition(JobAction::Start).unwrap();
        assert_eq!(previous, JobStatus::Pending);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_attach_file_rejected_after_start() {
        let mut job = job_with_file(3);
        job.transition(JobAction::Start).unwrap();
        let err = job.attach_file(sample_file(), 10).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidStateTransition {
                current: JobStatus::Processing,
                action: JobAction::AttachFile
            }
        ));
        assert_eq!(job.total_rows, 3);
    }

    #[test]
    fn test_record_row_keeps_counters_consistent() {
        let mut job = job_with_file(3);
        job.transition(JobAction::Start).unwrap();
        job.record_row(true);
        job.record_row(false);
        assert_eq!(job.processed_rows, 2);
        assert_eq!(job.success_rows, 1);
        assert_eq!(job.error_rows, 1);
        assert_eq!(job.checkpoint_row_index, 2);
        assert_eq!(job.next_row_number(), 3);
        assert!(job.counters_consistent());
    }

    #[test]
    fn test_complete_sets_completed_at() {
        let mut job = job_with_file(0);
        job.transition(JobAction::Start).unwrap();
        job.transition(JobAction::Complete).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_fail_then_retry_clears_error_message() {
        let mut job = job_with_file(5);
        job.transition(JobAction::Start).unwrap();
        job.record_row(true);
        job.fail("source file unreadable".to_string()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.is_resumable());
        assert_eq!(job.error_message.as_deref(), Some("source file unreadable"));

        job.transition(JobAction::Retry).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.error_message.is_none());
        assert_eq!(job.checkpoint_row_index, 1);
    }

    #[test]
    fn test_resume_rejects_invalid_checkpoint() {
        let mut job = job_with_file(2);
        job.transition(JobAction::Start).unwrap();
        job.transition(JobAction::Pause).unwrap();
        job.checkpoint_row_index = 7;
        assert_eq!(
            job.transition(JobAction::Resume),
            Err(TransitionError::CheckpointInvalid {
                checkpoint: 7,
                total_rows: 2
            })
        );
        assert_eq!(job.status, JobStatus::Paused);
    }

    #[test]
    fn test_cancelled_job_cannot_resume_or_retry() {
        let mut job = job_with_file(5);
        job.transition(JobAction::Start).unwrap();
        job.transition(JobAction::Cancel).unwrap();
        assert!(job.status.is_terminal());
        assert!(!job.is_resumable());
        assert!(job.transition(JobAction::Resume).is_err());
        assert!(job.transition(JobAction::Retry).is_err());
    }

    #[test]
    fn test_status_display_and_parse() {
        for status in JobStatus::ALL {
            assert_eq!(
                JobStatus::from_str_value(&status.to_string()).unwrap(),
                status
            );
        }
        assert!(JobStatus::from_str_value("retrying").is_err());
    }

    #[test]
    fn test_error_message_names_state_and_action() {
        let err = JobStatus::Completed.next(JobAction::Resume).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid state transition: cannot resume a job in completed state"
        );
    }
}

pub mod attach_file;
pub mod batch_scheduler;
pub mod cancel_batch;
pub mod create_batch;
pub mod delete_batch;
pub mod error;
pub mod execute_batch;
pub mod execution_registry;
pub mod generate_template;
pub mod get_batch;
pub mod get_batch_errors;
mod job_transition;
pub mod list_batches;
pub mod pause_batch;
pub mod recover_batches;
pub mod resume_batch;
pub mod retry_batch;
pub mod start_batch;

pub use attach_file::AttachFileUseCase;
pub use batch_scheduler::BatchScheduler;
pub use cancel_batch::CancelBatchUseCase;
pub use create_batch::{CreateBatchInput, CreateBatchUseCase};
pub use delete_batch::DeleteBatchUseCase;
pub use error::BatchImportError;
pub use execute_batch::{ExecuteBatchUseCase, RunnerSettings};
pub use execution_registry::{ControlSignal, ExecutionRegistry};
pub use generate_template::GenerateTemplateUseCase;
pub use get_batch::GetBatchUseCase;
pub use get_batch_errors::GetBatchErrorsUseCase;
pub use list_batches::{ListBatchesInput, ListBatchesOutput, ListBatchesUseCase};
pub use pause_batch::PauseBatchUseCase;
pub use recover_batches::RecoverBatchesUseCase;
pub use resume_batch::ResumeBatchUseCase;
pub use retry_batch::RetryBatchUseCase;
pub use start_batch::StartBatchUseCase;

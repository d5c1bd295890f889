pub mod batch_handler;
pub mod error;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::usecase::{
    AttachFileUseCase, CancelBatchUseCase, CreateBatchUseCase, DeleteBatchUseCase,
    GenerateTemplateUseCase, GetBatchErrorsUseCase, GetBatchUseCase, ListBatchesUseCase,
    PauseBatchUseCase, ResumeBatchUseCase, RetryBatchUseCase, StartBatchUseCase,
};

/// multipart の境界やヘッダーに見込む余裕。
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub create_batch_uc: Arc<CreateBatchUseCase>,
    pub attach_file_uc: Arc<AttachFileUseCase>,
    pub start_batch_uc: Arc<StartBatchUseCase>,
    pub pause_batch_uc: Arc<PauseBatchUseCase>,
    pub resume_batch_uc: Arc<ResumeBatchUseCase>,
    pub cancel_batch_uc: Arc<CancelBatchUseCase>,
    pub retry_batch_uc: Arc<RetryBatchUseCase>,
    pub delete_batch_uc: Arc<DeleteBatchUseCase>,
    pub get_batch_uc: Arc<GetBatchUseCase>,
    pub get_batch_errors_uc: Arc<GetBatchErrorsUseCase>,
    pub list_batches_uc: Arc<ListBatchesUseCase>,
    pub generate_template_uc: Arc<GenerateTemplateUseCase>,
    /// アップロードを受け付ける CSV の最大バイト数。
    pub max_upload_bytes: usize,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        batch_handler::healthz,
        batch_handler::readyz,
        batch_handler::create_batch,
        batch_handler::list_batches,
        batch_handler::get_batch,
        batch_handler::delete_batch,
        batch_handler::upload_file,
        batch_handler::start_batch,
        batch_handler::pause_batch,
        batch_handler::resume_batch,
        batch_handler::cancel_batch,
        batch_handler::retry_batch,
        batch_handler::get_batch_errors,
        batch_handler::download_template,
        batch_handler::download_catalog_template,
    ),
    components(schemas(
        batch_handler::CreateBatchRequest,
        batch_handler::BatchJobResponse,
        batch_handler::ListBatchesResponse,
        batch_handler::PaginationResponse,
        batch_handler::RowErrorResponse,
        batch_handler::BatchErrorsResponse,
        batch_handler::DeleteBatchResponse,
        batch_handler::SourceFileResponse,
        batch_handler::UploadFileForm,
        crate::domain::entity::batch_import_job::JobStatus,
        crate::domain::entity::row_error::ErrorSeverity,
    )),
)]
pub struct ApiDoc;

/// REST API ルーターを構築する。
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Health / Readiness / OpenAPI
        .route("/healthz", get(batch_handler::healthz))
        .route("/readyz", get(batch_handler::readyz))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // Batch import endpoints
        .route(
            "/api/v1/batches",
            post(batch_handler::create_batch).get(batch_handler::list_batches),
        )
        .route(
            "/api/v1/batches/template",
            get(batch_handler::download_template),
        )
        .route(
            "/api/v1/batches/template/{catalog_id}",
            get(batch_handler::download_catalog_template),
        )
        .route(
            "/api/v1/batches/{id}",
            get(batch_handler::get_batch).delete(batch_handler::delete_batch),
        )
        .route(
            "/api/v1/batches/{id}/upload",
            post(batch_handler::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/v1/batches/{id}/start", post(batch_handler::start_batch))
        .route("/api/v1/batches/{id}/pause", post(batch_handler::pause_batch))
        .route(
            "/api/v1/batches/{id}/resume",
            post(batch_handler::resume_batch),
        )
        .route(
            "/api/v1/batches/{id}/cancel",
            post(batch_handler::cancel_batch),
        )
        .route("/api/v1/batches/{id}/retry", post(batch_handler::retry_batch))
        .route(
            "/api/v1/batches/{id}/errors",
            get(batch_handler::get_batch_errors),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ErrorResponse は統一エラーレスポンス。
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
                details: vec![],
            },
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.error.details = details;
        self
    }
}

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::error::ApiError;
use super::AppState;
use crate::domain::entity::batch_import_job::{BatchImportJob, JobStatus};
use crate::domain::entity::row_error::{BatchImportRowError, ErrorSeverity};
use crate::usecase::{CreateBatchInput, ListBatchesInput};

// --- Request / Response DTOs ---

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateBatchRequest {
    #[validate(length(min = 1, max = 255, message = "name must be 1 to 255 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    /// 対象カタログ。省略時は既定カタログ。
    pub catalog_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListBatchesQuery {
    pub status: Option<String>,
    pub page: Option<i32>,
    pub page_size: Option<i32>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceFileResponse {
    pub original_name: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchJobResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub catalog_id: Option<String>,
    pub status: JobStatus,
    pub source_file: Option<SourceFileResponse>,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub success_rows: i64,
    pub error_rows: i64,
    pub checkpoint_row_index: i64,
    /// チェックポイントから再開できる停止状態かどうか。
    pub resumable: bool,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<BatchImportJob> for BatchJobResponse {
    fn from(job: BatchImportJob) -> Self {
        let resumable = job.is_resumable();
        Self {
            id: job.id.to_string(),
            name: job.name,
            description: job.description,
            catalog_id: job.catalog_id.map(|id| id.to_string()),
            status: job.status,
            source_file: job.source_file.map(|f| SourceFileResponse {
                original_name: f.original_name,
                size_bytes: f.size_bytes,
                checksum_sha256: f.checksum_sha256,
            }),
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            success_rows: job.success_rows,
            error_rows: job.error_rows,
            checkpoint_row_index: job.checkpoint_row_index,
            resumable,
            error_message: job.error_message,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchJobResponse>,
    pub pagination: PaginationResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaginationResponse {
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
    pub has_next: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RowErrorResponse {
    pub id: String,
    pub row_number: i64,
    pub field: Option<String>,
    pub message: String,
    pub severity: ErrorSeverity,
    pub created_at: String,
}

impl From<BatchImportRowError> for RowErrorResponse {
    fn from(e: BatchImportRowError) -> Self {
        Self {
            id: e.id.to_string(),
            row_number: e.row_number,
            field: e.field,
            message: e.message,
            severity: e.severity,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchErrorsResponse {
    pub job_id: String,
    pub errors: Vec<RowErrorResponse>,
    pub total_count: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteBatchResponse {
    pub success: bool,
    pub message: String,
}

/// multipart アップロードの形式（OpenAPI 用）。
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadFileForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

fn parse_uuid(raw: &str, name: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation(format!("invalid {name}: {raw}")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::Validation(e.body_text())
    }
}

fn csv_attachment(file_name: &str, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
}

// --- Handlers ---

#[utoipa::path(get, path = "/healthz", responses((status = 200, description = "Health check OK")))]
pub async fn healthz() -> &'static str {
    "ok"
}

#[utoipa::path(get, path = "/readyz", responses((status = 200, description = "Ready")))]
pub async fn readyz() -> &'static str {
    "ok"
}

#[utoipa::path(
    post,
    path = "/api/v1/batches",
    request_body = CreateBatchRequest,
    responses(
        (status = 201, description = "Batch import job created", body = BatchJobResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Catalog not found"),
    )
)]
pub async fn create_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<BatchJobResponse>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let catalog_id = req
        .catalog_id
        .as_deref()
        .map(|raw| parse_uuid(raw, "catalog_id"))
        .transpose()?;

    let job = state
        .create_batch_uc
        .execute(CreateBatchInput {
            name: req.name,
            description: req.description,
            catalog_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("page" = Option<i32>, Query, description = "Page number"),
        ("page_size" = Option<i32>, Query, description = "Page size (max 100)"),
    ),
    responses(
        (status = 200, description = "Batch import jobs", body = ListBatchesResponse),
        (status = 400, description = "Validation error"),
    )
)]
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<ListBatchesQuery>,
) -> Result<Json<ListBatchesResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(JobStatus::from_str_value)
        .transpose()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let out = state
        .list_batches_uc
        .execute(ListBatchesInput {
            status,
            page: query.page,
            page_size: query.page_size,
        })
        .await?;

    Ok(Json(ListBatchesResponse {
        batches: out.jobs.into_iter().map(Into::into).collect(),
        pagination: PaginationResponse {
            total_count: out.total_count,
            page: out.page,
            page_size: out.page_size,
            has_next: out.has_next,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Job status and counters", body = BatchJobResponse),
        (status = 404, description = "Not found"),
    )
)]
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let job = state.get_batch_uc.execute(id).await?;
    Ok(Json(job.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/batches/{id}",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Deleted", body = DeleteBatchResponse),
        (status = 404, description = "Not found"),
        (status = 409, description = "Job is not pending or terminal"),
    )
)]
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteBatchResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    state.delete_batch_uc.execute(id).await?;
    Ok(Json(DeleteBatchResponse {
        success: true,
        message: format!("batch import job {id} deleted"),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/upload",
    params(("id" = String, Path, description = "Batch import job ID")),
    request_body(content = UploadFileForm, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "File attached", body = BatchJobResponse),
        (status = 409, description = "Job is not pending"),
        (status = 413, description = "Payload too large"),
        (status = 422, description = "Invalid file"),
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchJobResponse>), ApiError> {
    let id = parse_uuid(&id, "id")?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| {
        ApiError::Validation("multipart field 'file' is required".to_string())
    })?;

    let job = state
        .attach_file_uc
        .execute(id, &file_name, bytes.to_vec())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/start",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Started", body = BatchJobResponse),
        (status = 409, description = "Invalid state transition or file missing"),
    )
)]
pub async fn start_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.start_batch_uc.execute(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/pause",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Paused", body = BatchJobResponse),
        (status = 409, description = "Invalid state transition"),
    )
)]
pub async fn pause_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.pause_batch_uc.execute(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/resume",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Resumed", body = BatchJobResponse),
        (status = 409, description = "Invalid state transition"),
    )
)]
pub async fn resume_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.resume_batch_uc.execute(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/cancel",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Cancelled", body = BatchJobResponse),
        (status = 409, description = "Invalid state transition"),
    )
)]
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.cancel_batch_uc.execute(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/retry",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Retrying from checkpoint", body = BatchJobResponse),
        (status = 409, description = "Invalid state transition"),
    )
)]
pub async fn retry_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    Ok(Json(state.retry_batch_uc.execute(id).await?.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/errors",
    params(("id" = String, Path, description = "Batch import job ID")),
    responses(
        (status = 200, description = "Row errors ordered by row number", body = BatchErrorsResponse),
        (status = 404, description = "Not found"),
    )
)]
pub async fn get_batch_errors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchErrorsResponse>, ApiError> {
    let id = parse_uuid(&id, "id")?;
    let errors = state.get_batch_errors_uc.execute(id).await?;
    Ok(Json(BatchErrorsResponse {
        job_id: id.to_string(),
        total_count: errors.len(),
        errors: errors.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches/template",
    responses((status = 200, description = "CSV template for the default catalog", body = String, content_type = "text/csv"))
)]
pub async fn download_template(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state.generate_template_uc.execute(None).await?;
    Ok(csv_attachment("batch-import-template.csv", body))
}

#[utoipa::path(
    get,
    path = "/api/v1/batches/template/{catalog_id}",
    params(("catalog_id" = String, Path, description = "Catalog ID")),
    responses(
        (status = 200, description = "CSV template for the catalog", body = String, content_type = "text/csv"),
        (status = 404, description = "Catalog not found"),
    )
)]
pub async fn download_catalog_template(
    State(state): State<AppState>,
    Path(catalog_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog_id = parse_uuid(&catalog_id, "catalog_id")?;
    let body = state.generate_template_uc.execute(Some(catalog_id)).await?;
    Ok(csv_attachment(
        &format!("batch-import-template-{catalog_id}.csv"),
        body,
    ))
}

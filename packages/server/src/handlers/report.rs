use std::cmp;
use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common::ReportType;
use common::report_job::{ExecutionInfo, ReportJob, ResultSnapshot};
use common::worker::Task;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

use crate::entity::{report, test_case, test_execution, test_plan, test_result, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::execution::find_execution;
use crate::models::report::*;
use crate::models::shared::{Pagination, escape_like};
use crate::state::AppState;

/// Build a report job by snapshotting an execution and its results.
///
/// All display fields are resolved here so the worker needs no database
/// access. When `name` is None a default of
/// "<plan name> - Test Report - <timestamp>" is used.
pub(crate) async fn build_report_job(
    db: &DatabaseConnection,
    execution: &test_execution::Model,
    report_type: ReportType,
    name: Option<String>,
    description: String,
    requested_by: i32,
) -> Result<ReportJob, AppError> {
    let plan = test_plan::Entity::find_by_id(execution.plan_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Execution plan not found".into()))?;

    let executor = user::Entity::find_by_id(execution.executor_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Execution executor not found".into()))?;

    let rows = test_result::Entity::find()
        .filter(test_result::Column::ExecutionId.eq(execution.id))
        .find_also_related(test_case::Entity)
        .order_by_asc(test_result::Column::Id)
        .all(db)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for (result, case) in rows {
        let case = case.ok_or_else(|| AppError::Internal("Result case not found".into()))?;
        results.push(ResultSnapshot {
            case_id: case.id,
            case_name: case.name,
            status: result.status,
            actual_result: result.actual_result,
            remarks: result.remarks,
            execution_time: result.execution_time,
            updated_at: result.updated_at,
        });
    }

    let name = name.unwrap_or_else(|| {
        format!(
            "{} - Test Report - {}",
            plan.name,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )
    });

    Ok(ReportJob::new(
        report_type,
        name,
        description,
        requested_by,
        ExecutionInfo {
            execution_id: execution.id,
            plan_name: plan.name,
            executor_name: executor.username,
            status: execution.status,
            start_time: execution.start_time,
            end_time: execution.end_time,
        },
        results,
    ))
}

/// Publish a report job to the worker queue.
pub(crate) async fn enqueue_report_job(state: &AppState, job: &ReportJob) -> Result<(), AppError> {
    let Some(ref mq) = state.mq else {
        return Err(AppError::ServiceUnavailable(
            "Report generation queue is not available".into(),
        ));
    };

    let task = Task {
        id: job.job_id.clone(),
        task_type: "report".into(),
        payload: serde_json::to_value(job)
            .map_err(|e| AppError::Internal(format!("Failed to serialize report job: {e}")))?,
    };

    mq.publish(&state.config.mq.queue_name, None, &task, None)
        .await
        .map_err(|e| {
            AppError::ServiceUnavailable(format!("Failed to enqueue report job: {e}"))
        })?;

    info!(
        job_id = %job.job_id,
        execution_id = job.execution.execution_id,
        report_type = %job.report_type,
        results = job.results.len(),
        "Report job enqueued"
    );

    Ok(())
}

#[utoipa::path(
    post,
    path = "/generate",
    tag = "Reports",
    operation_id = "generateReport",
    summary = "Generate a report for an execution",
    description = "Enqueues an asynchronous report-generation job and returns its handle. The \
        report row appears once the worker has produced the artifact; the request never blocks \
        on rendering.",
    request_body = GenerateReportRequest,
    responses(
        (status = 200, description = "Job enqueued", body = GenerateReportResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Report queue unavailable (SERVICE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(execution_id = payload.execution_id))]
pub async fn generate_report(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<GenerateReportRequest>,
) -> Result<Json<GenerateReportResponse>, AppError> {
    validate_generate_report(&payload)?;

    let execution = find_execution(&state.db, payload.execution_id).await?;

    let job = build_report_job(
        &state.db,
        &execution,
        payload.report_type.unwrap_or_default(),
        payload.name,
        payload.description.unwrap_or_default(),
        auth_user.user_id,
    )
    .await?;

    enqueue_report_job(&state, &job).await?;

    Ok(Json(GenerateReportResponse {
        message: "Report generation task submitted".into(),
        task_id: job.job_id,
    }))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Reports",
    operation_id = "listReports",
    summary = "List reports with pagination and search",
    params(ReportListQuery),
    responses(
        (status = 200, description = "List of reports", body = ReportListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query))]
pub async fn list_reports(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ReportListResponse>, AppError> {
    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select = report::Entity::find();

    if let Some(eid) = query.execution_id {
        select = select.filter(report::Column::ExecutionId.eq(eid));
    }
    if let Some(ref keyword) = query.keyword {
        let term = escape_like(keyword.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(report::Column::Name)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by_desc(report::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(ReportResponse::from)
        .collect();

    Ok(Json(ReportListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Reports",
    operation_id = "getReport",
    summary = "Get a report by ID",
    params(("id" = i32, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report details", body = ReportResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Report not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_report(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ReportResponse>, AppError> {
    let model = find_report(&state.db, id).await?;
    Ok(Json(model.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Reports",
    operation_id = "updateReport",
    summary = "Update report metadata",
    description = "Reports are immutable once generated except for their metadata: name, \
        description and visibility.",
    params(("id" = i32, Path, description = "Report ID")),
    request_body = UpdateReportRequest,
    responses(
        (status = 200, description = "Report updated", body = ReportResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Report not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(id))]
pub async fn update_report(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateReportRequest>,
) -> Result<Json<ReportResponse>, AppError> {
    validate_update_report(&payload)?;

    if payload == UpdateReportRequest::default() {
        let existing = find_report(&state.db, id).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;

    let existing = find_report(&txn, id).await?;
    let mut active: report::ActiveModel = existing.into();

    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    match payload.description {
        Some(Some(desc)) => active.description = Set(Some(desc)),
        Some(None) => active.description = Set(None),
        None => {}
    }
    if let Some(is_public) = payload.is_public {
        active.is_public = Set(is_public);
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Reports",
    operation_id = "deleteReport",
    summary = "Delete a report record",
    description = "Deletes the report row. The artifact on disk is left in place. Requires staff.",
    params(("id" = i32, Path, description = "Report ID")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Report not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_report(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    find_report(&state.db, id).await?;

    report::Entity::delete_by_id(id).exec(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/download",
    tag = "Reports",
    operation_id = "downloadReport",
    summary = "Download a report artifact",
    description = "Directory-based reports (allure) are archived into a zip on the fly; single \
        files are streamed directly.",
    params(("id" = i32, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report content"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Report or artifact not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn download_report(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let report = find_report(&state.db, id).await?;
    build_download_response(&report).await
}

#[utoipa::path(
    get,
    path = "/{id}/view",
    tag = "Reports",
    operation_id = "viewReport",
    summary = "View a report as HTML",
    description = "Serves the allure index document or the HTML file content inline. Anything \
        else falls back to the download behaviour.",
    params(("id" = i32, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report content"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Report or artifact not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn view_report(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    let report = find_report(&state.db, id).await?;

    let path = PathBuf::from(&report.file_path);
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| AppError::NotFound("Report file not found".into()))?;

    if report.report_type == ReportType::Allure && meta.is_dir() {
        let index = path.join("index.html");
        if tokio::fs::try_exists(&index).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(&index)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to read report index: {e}")))?;
            return Ok(html_response(content));
        }
    }

    if report.report_type == ReportType::Html
        && meta.is_file()
        && report.file_path.ends_with(".html")
    {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read report file: {e}")))?;
        return Ok(html_response(content));
    }

    build_download_response(&report).await
}

fn html_response(content: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        content,
    )
        .into_response()
}

/// Build a download response: zip archive for directories, streamed bytes
/// for single files.
async fn build_download_response(report: &report::Model) -> Result<Response, AppError> {
    let path = PathBuf::from(&report.file_path);
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| AppError::NotFound("Report file not found".into()))?;

    if meta.is_dir() {
        let bytes = zip_directory(&path)?;
        let filename = format!("{}.zip", sanitize_filename(&report.name));

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/zip")
            .header(header::CONTENT_LENGTH, bytes.len().to_string())
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .body(Body::from(bytes))
            .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;
        return Ok(response);
    }

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open report file: {e}")))?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("report")
        .to_string();
    let content_type = mime_guess::from_path(&path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, meta.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", sanitize_filename(&filename)),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}

/// Archive a report directory into an in-memory zip. Report directories are
/// bounded by a single execution's result set, so buffering is fine.
fn zip_directory(dir: &FsPath) -> Result<Vec<u8>, AppError> {
    let cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    add_directory_entries(&mut writer, dir, dir, options)?;

    let cursor = writer
        .finish()
        .map_err(|e| AppError::Internal(format!("Failed to finish zip archive: {e}")))?;
    Ok(cursor.into_inner())
}

fn add_directory_entries(
    writer: &mut zip::ZipWriter<std::io::Cursor<Vec<u8>>>,
    root: &FsPath,
    dir: &FsPath,
    options: zip::write::SimpleFileOptions,
) -> Result<(), AppError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::Internal(format!("Failed to read report directory: {e}")))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| AppError::Internal(format!("Failed to read directory entry: {e}")))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| AppError::Internal(format!("Path outside report directory: {e}")))?;
        let archive_name = relative.to_string_lossy().replace('\\', "/");

        if path.is_dir() {
            add_directory_entries(writer, root, &path, options)?;
        } else {
            writer
                .start_file(archive_name, options)
                .map_err(|e| AppError::Internal(format!("Failed to start zip entry: {e}")))?;
            let content = std::fs::read(&path)
                .map_err(|e| AppError::Internal(format!("Failed to read report file: {e}")))?;
            writer
                .write_all(&content)
                .map_err(|e| AppError::Internal(format!("Failed to write zip entry: {e}")))?;
        }
    }

    Ok(())
}

/// Keep only characters that are safe inside a quoted filename.
fn sanitize_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\' | '/'))
        .collect();
    if safe.is_empty() { "report".into() } else { safe }
}

async fn find_report<C: ConnectionTrait>(db: &C, id: i32) -> Result<report::Model, AppError> {
    report::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".into()))
}

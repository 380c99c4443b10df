use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use common::ResultStatus;
use sea_orm::sea_query::LockType;
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{test_case, test_result, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::result::*;
use crate::state::AppState;

/// Stamp the system-controlled fields on a status change.
///
/// `execution_time` and `executor_id` are set by the server when a result
/// first leaves `pending`; whatever the caller supplies for them is ignored
/// because they are not part of the request types at all.
fn stamp_if_leaving_pending(
    active: &mut test_result::ActiveModel,
    previous: ResultStatus,
    next: ResultStatus,
    acting_user: i32,
    now: chrono::DateTime<Utc>,
) {
    if previous == ResultStatus::Pending && next != ResultStatus::Pending {
        active.execution_time = Set(Some(now));
        active.executor_id = Set(Some(acting_user));
    }
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Results",
    operation_id = "getResult",
    summary = "Get a test result by ID",
    params(("id" = i32, Path, description = "Result ID")),
    responses(
        (status = 200, description = "Result details", body = ResultResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Result not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_result(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ResultResponse>, AppError> {
    let result = find_result(&state.db, id).await?;
    let response = build_result_response(&state.db, result).await?;
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Results",
    operation_id = "updateResult",
    summary = "Update a single test result",
    description = "Updates status, actual result and/or remarks. When the status first moves away \
        from pending, the execution time and executor are stamped by the server; they are never \
        client-writable.",
    params(("id" = i32, Path, description = "Result ID")),
    request_body = UpdateResultRequest,
    responses(
        (status = 200, description = "Result updated", body = ResultResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Result not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_result(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateResultRequest>,
) -> Result<Json<ResultResponse>, AppError> {
    if payload == UpdateResultRequest::default() {
        let existing = find_result(&state.db, id).await?;
        let response = build_result_response(&state.db, existing).await?;
        return Ok(Json(response));
    }

    let txn = state.db.begin().await?;

    let existing = test_result::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Test result not found".into()))?;

    let previous = existing.status;
    let now = Utc::now();
    let mut active: test_result::ActiveModel = existing.into();

    if let Some(status) = payload.status {
        active.status = Set(status);
        stamp_if_leaving_pending(&mut active, previous, status, auth_user.user_id, now);
    }
    match payload.actual_result {
        Some(Some(v)) => active.actual_result = Set(Some(v)),
        Some(None) => active.actual_result = Set(None),
        None => {}
    }
    match payload.remarks {
        Some(Some(v)) => active.remarks = Set(Some(v)),
        Some(None) => active.remarks = Set(None),
        None => {}
    }
    active.updated_at = Set(now);

    let model = active.update(&txn).await?;
    txn.commit().await?;

    let response = build_result_response(&state.db, model).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/batch_update",
    tag = "Results",
    operation_id = "batchUpdateResults",
    summary = "Update several test results at once",
    description = "Applies each item independently inside one transaction. An unknown ID produces \
        a per-item error entry without aborting the rest; partial success is the normal outcome \
        and is reported with HTTP 200.",
    request_body = BatchUpdateRequest,
    responses(
        (status = 200, description = "Batch processed", body = BatchUpdateResponse),
        (status = 400, description = "Invalid batch shape (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(items = payload.results.len()))]
pub async fn batch_update_results(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<BatchUpdateRequest>,
) -> Result<Json<BatchUpdateResponse>, AppError> {
    validate_batch_update(&payload)?;

    let mut updated_count = 0usize;
    let mut errors: Vec<BatchUpdateError> = Vec::new();

    let txn = state.db.begin().await?;

    for item in &payload.results {
        let Some(existing) = test_result::Entity::find_by_id(item.id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            errors.push(BatchUpdateError {
                id: item.id,
                message: "Test result not found".into(),
            });
            continue;
        };

        let previous = existing.status;
        let now = Utc::now();
        let mut active: test_result::ActiveModel = existing.into();

        if let Some(status) = item.status {
            active.status = Set(status);
            stamp_if_leaving_pending(&mut active, previous, status, auth_user.user_id, now);
        }
        if let Some(ref remarks) = item.remarks {
            active.remarks = Set(Some(remarks.clone()));
        }
        if let Some(ref actual) = item.actual_result {
            active.actual_result = Set(Some(actual.clone()));
        }
        active.updated_at = Set(now);

        active.update(&txn).await?;
        updated_count += 1;
    }

    txn.commit().await?;

    info!(
        updated_count,
        failed = errors.len(),
        "Batch result update applied"
    );

    Ok(Json(BatchUpdateResponse {
        message: format!("Updated {updated_count} test results"),
        updated_count,
        errors,
    }))
}

async fn build_result_response(
    db: &DatabaseConnection,
    result: test_result::Model,
) -> Result<ResultResponse, AppError> {
    let case = test_case::Entity::find_by_id(result.case_id).one(db).await?;

    let executor_name = match result.executor_id {
        Some(uid) => user::Entity::find_by_id(uid)
            .one(db)
            .await?
            .map(|u| u.username),
        None => None,
    };

    Ok(ResultResponse::from_parts(result, case, executor_name))
}

async fn find_result<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<test_result::Model, AppError> {
    test_result::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test result not found".into()))
}

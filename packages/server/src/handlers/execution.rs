use std::cmp;
use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::{ExecutionStatus, ReportType, ResultStatus};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, LockType};
use sea_orm::*;
use tracing::{instrument, warn};

use crate::entity::{report, test_case, test_execution, test_plan, test_result, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::report::{build_report_job, enqueue_report_job};
use crate::models::execution::*;
use crate::models::result::ResultResponse;
use crate::models::shared::{Pagination, escape_like};
use crate::state::AppState;

/// Actions that drive the execution state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionAction {
    Start,
    Pause,
    Complete,
    Abort,
}

/// Compute the target status for an action, or reject it.
///
/// The error names the current status so callers can see why the
/// transition is illegal.
pub fn apply_transition(
    current: ExecutionStatus,
    action: ExecutionAction,
) -> Result<ExecutionStatus, AppError> {
    use ExecutionStatus::*;

    match action {
        ExecutionAction::Start => match current {
            Pending | Paused => Ok(Running),
            Running | Completed | Aborted => Err(AppError::InvalidOperation(format!(
                "Cannot start an execution in status {current}"
            ))),
        },
        ExecutionAction::Pause => match current {
            Running => Ok(Paused),
            Pending | Paused | Completed | Aborted => Err(AppError::InvalidOperation(format!(
                "Cannot pause an execution in status {current}"
            ))),
        },
        ExecutionAction::Complete => match current {
            Running | Paused => Ok(Completed),
            Pending | Completed | Aborted => Err(AppError::InvalidOperation(format!(
                "Cannot complete an execution in status {current}"
            ))),
        },
        ExecutionAction::Abort => match current {
            Pending | Running | Paused => Ok(Aborted),
            Completed | Aborted => Err(AppError::InvalidOperation(format!(
                "Cannot abort an execution in status {current}"
            ))),
        },
    }
}

/// Apply a transition to a locked execution row and stamp timestamps.
async fn transition_execution(
    txn: &DatabaseTransaction,
    id: i32,
    action: ExecutionAction,
) -> Result<test_execution::Model, AppError> {
    let execution = find_execution_for_update(txn, id).await?;

    let next = apply_transition(execution.status, action)?;

    let now = Utc::now();
    let mut active: test_execution::ActiveModel = execution.clone().into();
    active.status = Set(next);
    match action {
        // start_time is only set once; resuming keeps the original start.
        ExecutionAction::Start => {
            if execution.start_time.is_none() {
                active.start_time = Set(Some(now));
            }
        }
        ExecutionAction::Complete | ExecutionAction::Abort => {
            active.end_time = Set(Some(now));
        }
        ExecutionAction::Pause => {}
    }
    active.updated_at = Set(now);

    Ok(active.update(txn).await?)
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Executions",
    operation_id = "listExecutions",
    summary = "List executions with filters and pagination",
    params(ExecutionListQuery),
    responses(
        (status = 200, description = "List of executions", body = ExecutionListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query))]
pub async fn list_executions(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ExecutionListResponse>, AppError> {
    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select = test_execution::Entity::find().find_also_related(test_plan::Entity);

    if let Some(status) = query.status {
        select = select.filter(test_execution::Column::Status.eq(status));
    }
    if let Some(ref plan_name) = query.plan_name {
        let term = escape_like(plan_name.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(test_plan::Column::Name)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let total_pages = total.div_ceil(per_page);

    let rows = select
        .order_by_desc(test_execution::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = build_execution_list(&state.db, rows).await?;

    Ok(Json(ExecutionListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

/// Build execution responses with executor names and result counts resolved
/// in bulk.
async fn build_execution_list(
    db: &DatabaseConnection,
    rows: Vec<(test_execution::Model, Option<test_plan::Model>)>,
) -> Result<Vec<ExecutionResponse>, AppError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let executor_ids: Vec<i32> = rows.iter().map(|(e, _)| e.executor_id).collect();
    let users: HashMap<i32, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(executor_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let execution_ids: Vec<i32> = rows.iter().map(|(e, _)| e.id).collect();
    let counts: HashMap<i32, i64> = test_result::Entity::find()
        .filter(test_result::Column::ExecutionId.is_in(execution_ids))
        .select_only()
        .column(test_result::Column::ExecutionId)
        .column_as(test_result::Column::Id.count(), "count")
        .group_by(test_result::Column::ExecutionId)
        .into_tuple::<(i32, i64)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut data = Vec::with_capacity(rows.len());
    for (execution, plan) in rows {
        let plan = plan.ok_or_else(|| AppError::Internal("Execution plan not found".into()))?;
        let executor_name = users
            .get(&execution.executor_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Execution executor not found".into()))?;
        let results_count = counts.get(&execution.id).copied().unwrap_or(0) as u64;
        data.push(ExecutionResponse::from_parts(
            execution,
            plan,
            executor_name,
            results_count,
        ));
    }

    Ok(data)
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Executions",
    operation_id = "getExecution",
    summary = "Get an execution by ID",
    params(("id" = i32, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution details", body = ExecutionResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_execution(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ExecutionResponse>, AppError> {
    let execution = find_execution(&state.db, id).await?;
    let response = build_execution_response(&state.db, execution).await?;
    Ok(Json(response))
}

async fn build_execution_response(
    db: &DatabaseConnection,
    execution: test_execution::Model,
) -> Result<ExecutionResponse, AppError> {
    let plan = test_plan::Entity::find_by_id(execution.plan_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Execution plan not found".into()))?;

    let executor = user::Entity::find_by_id(execution.executor_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Execution executor not found".into()))?;

    let results_count = test_result::Entity::find()
        .filter(test_result::Column::ExecutionId.eq(execution.id))
        .count(db)
        .await?;

    Ok(ExecutionResponse::from_parts(
        execution,
        plan,
        executor.username,
        results_count,
    ))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Executions",
    operation_id = "deleteExecution",
    summary = "Delete an execution",
    description = "Permanently deletes an execution with its results and report records. Requires staff.",
    params(("id" = i32, Path, description = "Execution ID")),
    responses(
        (status = 204, description = "Execution deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_execution(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;

    find_execution_for_update(&txn, id).await?;

    test_result::Entity::delete_many()
        .filter(test_result::Column::ExecutionId.eq(id))
        .exec(&txn)
        .await?;

    report::Entity::delete_many()
        .filter(report::Column::ExecutionId.eq(id))
        .exec(&txn)
        .await?;

    test_execution::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/start",
    tag = "Executions",
    operation_id = "startExecution",
    summary = "Start or resume an execution",
    description = "Moves a pending or paused execution to running. The start time is set only on \
        the first start and preserved across pause/resume.",
    params(("id" = i32, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution started", body = TransitionResponse),
        (status = 400, description = "Illegal transition (INVALID_OPERATION)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn start_execution(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TransitionResponse>, AppError> {
    let txn = state.db.begin().await?;
    transition_execution(&txn, id, ExecutionAction::Start).await?;
    txn.commit().await?;

    Ok(Json(TransitionResponse {
        message: "Test execution started".into(),
        task_id: None,
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/pause",
    tag = "Executions",
    operation_id = "pauseExecution",
    summary = "Pause a running execution",
    params(("id" = i32, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution paused", body = TransitionResponse),
        (status = 400, description = "Illegal transition (INVALID_OPERATION)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn pause_execution(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TransitionResponse>, AppError> {
    let txn = state.db.begin().await?;
    transition_execution(&txn, id, ExecutionAction::Pause).await?;
    txn.commit().await?;

    Ok(Json(TransitionResponse {
        message: "Test execution paused".into(),
        task_id: None,
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/complete",
    tag = "Executions",
    operation_id = "completeExecution",
    summary = "Complete an execution",
    description = "Moves a running or paused execution to completed and stamps the end time. \
        Unless disabled via `auto_generate_report` (or server config), a report-generation job is \
        enqueued and its handle returned as `task_id`.",
    params(("id" = i32, Path, description = "Execution ID")),
    request_body = CompleteExecutionRequest,
    responses(
        (status = 200, description = "Execution completed", body = TransitionResponse),
        (status = 400, description = "Illegal transition (INVALID_OPERATION)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn complete_execution(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<CompleteExecutionRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let txn = state.db.begin().await?;
    let execution = transition_execution(&txn, id, ExecutionAction::Complete).await?;
    txn.commit().await?;

    let auto_generate = payload
        .auto_generate_report
        .unwrap_or(state.config.report.auto_generate);

    if !auto_generate {
        return Ok(Json(TransitionResponse {
            message: "Test execution completed".into(),
            task_id: None,
        }));
    }

    let report_type = payload.report_type.unwrap_or(ReportType::Allure);
    let description = format!(
        "Report generated automatically when execution {} completed",
        execution.id
    );

    // A queue hiccup must not fail the completed transition; the report can
    // be regenerated explicitly later.
    let task_id = match build_report_job(
        &state.db,
        &execution,
        report_type,
        None,
        description,
        auth_user.user_id,
    )
    .await
    {
        Ok(job) => match enqueue_report_job(&state, &job).await {
            Ok(()) => Some(job.job_id),
            Err(e) => {
                warn!(execution_id = execution.id, error = ?e, "Failed to enqueue report job");
                None
            }
        },
        Err(e) => {
            warn!(execution_id = execution.id, error = ?e, "Failed to build report job");
            None
        }
    };

    let message = if task_id.is_some() {
        "Test execution completed, report generation task submitted".to_string()
    } else {
        "Test execution completed".to_string()
    };

    Ok(Json(TransitionResponse { message, task_id }))
}

#[utoipa::path(
    post,
    path = "/{id}/abort",
    tag = "Executions",
    operation_id = "abortExecution",
    summary = "Abort an execution",
    params(("id" = i32, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution aborted", body = TransitionResponse),
        (status = 400, description = "Illegal transition (INVALID_OPERATION)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn abort_execution(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TransitionResponse>, AppError> {
    let txn = state.db.begin().await?;
    transition_execution(&txn, id, ExecutionAction::Abort).await?;
    txn.commit().await?;

    Ok(Json(TransitionResponse {
        message: "Test execution aborted".into(),
        task_id: None,
    }))
}

#[utoipa::path(
    get,
    path = "/{id}/results",
    tag = "Executions",
    operation_id = "listExecutionResults",
    summary = "List an execution's results with a status breakdown",
    description = "Returns the matching page of results plus a `stats` block counting every status \
        over the whole filtered set — the counts respect the filters but not the pagination.",
    params(
        ("id" = i32, Path, description = "Execution ID"),
        ResultListQuery,
    ),
    responses(
        (status = 200, description = "Results and statistics", body = ExecutionResultsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Execution not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query), fields(id))]
pub async fn list_execution_results(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<ResultListQuery>,
) -> Result<Json<ExecutionResultsResponse>, AppError> {
    find_execution(&state.db, id).await?;

    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let filtered = |status: Option<ResultStatus>| {
        let mut select = filtered_results(id, &query);
        if let Some(status) = status {
            select = select.filter(test_result::Column::Status.eq(status));
        }
        select
    };

    // Counted before pagination so the breakdown covers the full filtered set.
    let mut stats = ResultStats::default();
    for status in ResultStatus::ALL {
        let count = filtered(Some(*status)).count(&state.db).await?;
        stats.record(*status, count);
    }

    let total = stats.total;
    let total_pages = total.div_ceil(per_page);

    let rows = filtered(None)
        .order_by_desc(test_result::Column::UpdatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = build_result_list(&state.db, rows).await?;

    Ok(Json(ExecutionResultsResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
        stats,
    }))
}

/// Base query for an execution's results with the request filters applied.
/// The requested status filter is included; pagination is not.
fn filtered_results(
    execution_id: i32,
    query: &ResultListQuery,
) -> SelectTwo<test_result::Entity, test_case::Entity> {
    let mut select = test_result::Entity::find()
        .filter(test_result::Column::ExecutionId.eq(execution_id))
        .find_also_related(test_case::Entity);

    if let Some(status) = query.status {
        select = select.filter(test_result::Column::Status.eq(status));
    }
    if let Some(ref case_name) = query.case_name {
        let term = escape_like(case_name.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(test_case::Column::Name)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    select
}

/// Build result responses with executor names resolved in bulk.
pub(crate) async fn build_result_list(
    db: &DatabaseConnection,
    rows: Vec<(test_result::Model, Option<test_case::Model>)>,
) -> Result<Vec<ResultResponse>, AppError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let executor_ids: Vec<i32> = rows.iter().filter_map(|(r, _)| r.executor_id).collect();
    let users: HashMap<i32, String> = if executor_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(executor_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|(result, case)| {
            let executor_name = result.executor_id.and_then(|id| users.get(&id).cloned());
            ResultResponse::from_parts(result, case, executor_name)
        })
        .collect())
}

pub(crate) async fn find_execution<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<test_execution::Model, AppError> {
    test_execution::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test execution not found".into()))
}

pub(crate) async fn find_execution_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<test_execution::Model, AppError> {
    test_execution::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Test execution not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_runs_from_pending_and_paused() {
        assert_eq!(
            apply_transition(ExecutionStatus::Pending, ExecutionAction::Start).unwrap(),
            ExecutionStatus::Running
        );
        assert_eq!(
            apply_transition(ExecutionStatus::Paused, ExecutionAction::Start).unwrap(),
            ExecutionStatus::Running
        );
    }

    #[test]
    fn start_rejected_in_terminal_states() {
        for status in [ExecutionStatus::Completed, ExecutionStatus::Aborted] {
            let err = apply_transition(status, ExecutionAction::Start).unwrap_err();
            match err {
                AppError::InvalidOperation(msg) => {
                    assert!(msg.contains(status.as_str()), "message was: {msg}")
                }
                other => panic!("expected InvalidOperation, got {other:?}"),
            }
        }
    }

    #[test]
    fn pause_only_from_running() {
        assert_eq!(
            apply_transition(ExecutionStatus::Running, ExecutionAction::Pause).unwrap(),
            ExecutionStatus::Paused
        );
        assert!(apply_transition(ExecutionStatus::Pending, ExecutionAction::Pause).is_err());
        assert!(apply_transition(ExecutionStatus::Paused, ExecutionAction::Pause).is_err());
    }

    #[test]
    fn complete_from_running_or_paused() {
        assert_eq!(
            apply_transition(ExecutionStatus::Running, ExecutionAction::Complete).unwrap(),
            ExecutionStatus::Completed
        );
        assert_eq!(
            apply_transition(ExecutionStatus::Paused, ExecutionAction::Complete).unwrap(),
            ExecutionStatus::Completed
        );
        assert!(apply_transition(ExecutionStatus::Pending, ExecutionAction::Complete).is_err());
    }

    #[test]
    fn abort_from_any_non_terminal_state() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Paused,
        ] {
            assert_eq!(
                apply_transition(status, ExecutionAction::Abort).unwrap(),
                ExecutionStatus::Aborted
            );
        }
        assert!(apply_transition(ExecutionStatus::Completed, ExecutionAction::Abort).is_err());
        assert!(apply_transition(ExecutionStatus::Aborted, ExecutionAction::Abort).is_err());
    }
}

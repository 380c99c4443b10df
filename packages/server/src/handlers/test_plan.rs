use std::cmp;
use std::collections::HashSet;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::{ExecutionStatus, PlanStatus, ResultStatus};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, LockType};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{
    report, test_case, test_execution, test_plan, test_plan_case, test_result, user,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::project::find_project;
use crate::models::execution::ExecutionResponse;
use crate::models::shared::{MessageResponse, Pagination, escape_like};
use crate::models::test_plan::*;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Test Plans",
    operation_id = "createTestPlan",
    summary = "Create a new test plan",
    request_body = CreateTestPlanRequest,
    responses(
        (status = 201, description = "Test plan created", body = TestPlanResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name, project_id = payload.project_id))]
pub async fn create_test_plan(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTestPlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create_test_plan(&payload)?;

    let txn = state.db.begin().await?;

    find_project(&txn, payload.project_id).await?;

    let now = Utc::now();
    let new_plan = test_plan::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        status: Set(payload.status.unwrap_or_default()),
        start_time: Set(payload.start_time),
        end_time: Set(payload.end_time),
        project_id: Set(payload.project_id),
        creator_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = new_plan.insert(&txn).await?;
    txn.commit().await?;

    Ok((StatusCode::CREATED, Json(TestPlanResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Test Plans",
    operation_id = "listTestPlans",
    summary = "List test plans with filters and pagination",
    params(TestPlanListQuery),
    responses(
        (status = 200, description = "List of test plans", body = TestPlanListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query))]
pub async fn list_test_plans(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TestPlanListQuery>,
) -> Result<Json<TestPlanListResponse>, AppError> {
    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select = test_plan::Entity::find();

    if let Some(pid) = query.project_id {
        select = select.filter(test_plan::Column::ProjectId.eq(pid));
    }
    if let Some(status) = query.status {
        select = select.filter(test_plan::Column::Status.eq(status));
    }
    if let Some(ref keyword) = query.keyword {
        let term = escape_like(keyword.trim());
        if !term.is_empty() {
            let pattern = format!("%{}%", term.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(test_plan::Column::Name)))
                            .like(LikeExpr::new(pattern.clone()).escape('\\')),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(test_plan::Column::Description)))
                            .like(LikeExpr::new(pattern).escape('\\')),
                    ),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by_desc(test_plan::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(TestPlanResponse::from)
        .collect();

    Ok(Json(TestPlanListResponse {
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
    tag = "Test Plans",
    operation_id = "getTestPlan",
    summary = "Get a test plan with its planned cases",
    params(("id" = i32, Path, description = "Test plan ID")),
    responses(
        (status = 200, description = "Test plan details", body = TestPlanDetailResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Test plan not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_test_plan(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TestPlanDetailResponse>, AppError> {
    let plan = find_test_plan(&state.db, id).await?;

    let plan_cases = test_plan_case::Entity::find()
        .filter(test_plan_case::Column::PlanId.eq(id))
        .find_also_related(test_case::Entity)
        .order_by_asc(test_plan_case::Column::Position)
        .all(&state.db)
        .await?;

    let mut test_cases = Vec::with_capacity(plan_cases.len());
    for (assoc, case) in plan_cases {
        let case =
            case.ok_or_else(|| AppError::Internal("Planned case missing its test case".into()))?;
        test_cases.push(PlannedCaseItem {
            case_id: case.id,
            name: case.name,
            priority: case.priority,
            status: case.status,
            order: assoc.position,
        });
    }

    Ok(Json(TestPlanDetailResponse {
        plan: TestPlanResponse::from(plan),
        test_cases,
    }))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Test Plans",
    operation_id = "updateTestPlan",
    summary = "Update a test plan",
    description = "Partially updates a test plan using PATCH semantics — only provided fields are modified.",
    params(("id" = i32, Path, description = "Test plan ID")),
    request_body = UpdateTestPlanRequest,
    responses(
        (status = 200, description = "Test plan updated", body = TestPlanResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Test plan not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(id))]
pub async fn update_test_plan(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateTestPlanRequest>,
) -> Result<Json<TestPlanResponse>, AppError> {
    validate_update_test_plan(&payload)?;

    if payload == UpdateTestPlanRequest::default() {
        let existing = find_test_plan(&state.db, id).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;

    let existing = find_test_plan(&txn, id).await?;
    let mut active: test_plan::ActiveModel = existing.into();

    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    match payload.description {
        Some(Some(desc)) => active.description = Set(Some(desc)),
        Some(None) => active.description = Set(None),
        None => {}
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    match payload.start_time {
        Some(v) => active.start_time = Set(v),
        None => {}
    }
    match payload.end_time {
        Some(v) => active.end_time = Set(v),
        None => {}
    }
    active.updated_at = Set(Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Test Plans",
    operation_id = "deleteTestPlan",
    summary = "Delete a test plan",
    description = "Permanently deletes a test plan, its case associations and every execution that \
        ran against it (with their results and report records). Requires staff.",
    params(("id" = i32, Path, description = "Test plan ID")),
    responses(
        (status = 204, description = "Test plan deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Test plan not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_test_plan(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;

    find_test_plan_for_update(&txn, id).await?;

    let executions_of_plan = sea_orm::sea_query::Query::select()
        .column(test_execution::Column::Id)
        .from(test_execution::Entity)
        .and_where(test_execution::Column::PlanId.eq(id))
        .to_owned();

    test_result::Entity::delete_many()
        .filter(test_result::Column::ExecutionId.in_subquery(executions_of_plan.clone()))
        .exec(&txn)
        .await?;

    report::Entity::delete_many()
        .filter(report::Column::ExecutionId.in_subquery(executions_of_plan))
        .exec(&txn)
        .await?;

    test_execution::Entity::delete_many()
        .filter(test_execution::Column::PlanId.eq(id))
        .exec(&txn)
        .await?;

    test_plan_case::Entity::delete_many()
        .filter(test_plan_case::Column::PlanId.eq(id))
        .exec(&txn)
        .await?;

    test_plan::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/add_test_cases",
    tag = "Test Plans",
    operation_id = "addTestCases",
    summary = "Add test cases to a plan",
    description = "Appends the given cases to the plan in the supplied order. Cases already in the \
        plan are skipped, so repeating a call adds nothing. New cases are placed after the current \
        maximum order. Fails if any ID does not name an existing test case.",
    params(("id" = i32, Path, description = "Test plan ID")),
    request_body = AddTestCasesRequest,
    responses(
        (status = 200, description = "All cases were already in the plan", body = AddTestCasesResponse),
        (status = 201, description = "Cases added", body = AddTestCasesResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Plan or test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(plan_id))]
pub async fn add_test_cases(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(plan_id): Path<i32>,
    AppJson(payload): AppJson<AddTestCasesRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_add_test_cases(&payload)?;

    let txn = state.db.begin().await?;

    // Locking the plan row serializes concurrent add calls, so two requests
    // cannot both read the same max order and collide.
    find_test_plan_for_update(&txn, plan_id).await?;

    let found: Vec<i32> = test_case::Entity::find()
        .filter(test_case::Column::Id.is_in(payload.case_ids.clone()))
        .select_only()
        .column(test_case::Column::Id)
        .into_tuple()
        .all(&txn)
        .await?;
    let found_set: HashSet<i32> = found.into_iter().collect();
    let missing: Vec<i32> = payload
        .case_ids
        .iter()
        .copied()
        .filter(|id| !found_set.contains(id))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::NotFound(format!(
            "Test cases not found: {}",
            join_ids(&missing)
        )));
    }

    let existing: Vec<i32> = test_plan_case::Entity::find()
        .filter(test_plan_case::Column::PlanId.eq(plan_id))
        .select_only()
        .column(test_plan_case::Column::CaseId)
        .into_tuple()
        .all(&txn)
        .await?;
    let existing_set: HashSet<i32> = existing.into_iter().collect();

    let new_ids: Vec<i32> = payload
        .case_ids
        .iter()
        .copied()
        .filter(|id| !existing_set.contains(id))
        .collect();

    if new_ids.is_empty() {
        txn.commit().await?;
        return Ok((
            StatusCode::OK,
            Json(AddTestCasesResponse {
                message: "All test cases are already in the plan".into(),
                added: 0,
            }),
        ));
    }

    let max_position: Option<i32> = test_plan_case::Entity::find()
        .filter(test_plan_case::Column::PlanId.eq(plan_id))
        .select_only()
        .column_as(test_plan_case::Column::Position.max(), "max_position")
        .into_tuple::<Option<i32>>()
        .one(&txn)
        .await?
        .flatten();
    let mut position = max_position.unwrap_or(0);

    for case_id in &new_ids {
        position = position
            .checked_add(1)
            .ok_or_else(|| AppError::Validation("Order overflow".into()))?;
        let assoc = test_plan_case::ActiveModel {
            plan_id: Set(plan_id),
            case_id: Set(*case_id),
            position: Set(position),
            ..Default::default()
        };
        assoc.insert(&txn).await?;
    }

    txn.commit().await?;

    let added = new_ids.len();
    info!(plan_id, added, "Added test cases to plan");

    Ok((
        StatusCode::CREATED,
        Json(AddTestCasesResponse {
            message: format!("Added {added} test cases to the plan"),
            added,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/{id}/remove_test_case",
    tag = "Test Plans",
    operation_id = "removeTestCase",
    summary = "Remove a test case from a plan",
    params(
        ("id" = i32, Path, description = "Test plan ID"),
        RemoveTestCaseQuery,
    ),
    responses(
        (status = 200, description = "Case removed", body = MessageResponse),
        (status = 400, description = "Missing case_id parameter (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Plan not found or case not in plan (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query), fields(plan_id))]
pub async fn remove_test_case(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(plan_id): Path<i32>,
    Query(query): Query<RemoveTestCaseQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let case_id = query
        .case_id
        .ok_or_else(|| AppError::Validation("Missing case_id parameter".into()))?;

    let txn = state.db.begin().await?;

    find_test_plan(&txn, plan_id).await?;

    let deleted = test_plan_case::Entity::delete_many()
        .filter(test_plan_case::Column::PlanId.eq(plan_id))
        .filter(test_plan_case::Column::CaseId.eq(case_id))
        .exec(&txn)
        .await?;

    if deleted.rows_affected == 0 {
        return Err(AppError::NotFound("Test case is not in the plan".into()));
    }

    txn.commit().await?;

    Ok(Json(MessageResponse {
        message: "Test case removed from the plan".into(),
    }))
}

#[utoipa::path(
    put,
    path = "/{id}/reorder_test_cases",
    tag = "Test Plans",
    operation_id = "reorderTestCases",
    summary = "Reorder test cases within a plan",
    description = "Applies the given (case_id, order) assignments atomically. Every referenced case \
        must currently be in the plan; otherwise nothing changes and all unmatched IDs are reported.",
    params(("id" = i32, Path, description = "Test plan ID")),
    request_body = ReorderTestCasesRequest,
    responses(
        (status = 200, description = "Order updated", body = MessageResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Plan not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(plan_id))]
pub async fn reorder_test_cases(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(plan_id): Path<i32>,
    AppJson(payload): AppJson<ReorderTestCasesRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_reorder_test_cases(&payload)?;

    let txn = state.db.begin().await?;

    find_test_plan_for_update(&txn, plan_id).await?;

    let case_ids: Vec<i32> = payload.case_orders.iter().map(|o| o.case_id).collect();

    let associated: Vec<i32> = test_plan_case::Entity::find()
        .filter(test_plan_case::Column::PlanId.eq(plan_id))
        .filter(test_plan_case::Column::CaseId.is_in(case_ids.clone()))
        .select_only()
        .column(test_plan_case::Column::CaseId)
        .into_tuple()
        .all(&txn)
        .await?;
    let associated_set: HashSet<i32> = associated.into_iter().collect();

    let unmatched: Vec<i32> = case_ids
        .iter()
        .copied()
        .filter(|id| !associated_set.contains(id))
        .collect();
    if !unmatched.is_empty() {
        return Err(AppError::Validation(format!(
            "Test cases not in the plan: {}",
            join_ids(&unmatched)
        )));
    }

    for item in &payload.case_orders {
        test_plan_case::Entity::update_many()
            .filter(test_plan_case::Column::PlanId.eq(plan_id))
            .filter(test_plan_case::Column::CaseId.eq(item.case_id))
            .col_expr(test_plan_case::Column::Position, Expr::value(item.order))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    Ok(Json(MessageResponse {
        message: "Test case order updated".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/create_execution",
    tag = "Test Plans",
    operation_id = "createExecution",
    summary = "Create an execution from a plan",
    description = "Creates a pending execution and seeds one pending result per planned case, in \
        plan order, inside the same transaction. The result set is a snapshot: later plan edits do \
        not affect this execution. The plan must be ready or in_progress and contain at least one \
        case; a ready plan moves to in_progress.",
    params(("id" = i32, Path, description = "Test plan ID")),
    responses(
        (status = 201, description = "Execution created", body = ExecutionResponse),
        (status = 400, description = "Plan not executable or empty (INVALID_OPERATION, VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Plan not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(plan_id))]
pub async fn create_execution(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(plan_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;

    let plan = find_test_plan_for_update(&txn, plan_id).await?;

    if !plan.status.is_executable() {
        return Err(AppError::InvalidOperation(format!(
            "Cannot create an execution from a plan in status {}",
            plan.status
        )));
    }

    let plan_cases = test_plan_case::Entity::find()
        .filter(test_plan_case::Column::PlanId.eq(plan_id))
        .order_by_asc(test_plan_case::Column::Position)
        .all(&txn)
        .await?;

    if plan_cases.is_empty() {
        return Err(AppError::Validation(
            "Test plan does not contain any test cases".into(),
        ));
    }

    let now = Utc::now();
    let new_execution = test_execution::ActiveModel {
        plan_id: Set(plan_id),
        executor_id: Set(auth_user.user_id),
        status: Set(ExecutionStatus::Pending),
        start_time: Set(None),
        end_time: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let execution = new_execution.insert(&txn).await?;

    // Snapshot copy: one pending result per planned case, in plan order.
    for plan_case in &plan_cases {
        let result = test_result::ActiveModel {
            execution_id: Set(execution.id),
            case_id: Set(plan_case.case_id),
            status: Set(ResultStatus::Pending),
            actual_result: Set(None),
            remarks: Set(None),
            executor_id: Set(None),
            execution_time: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        result.insert(&txn).await?;
    }

    let plan = if plan.status == PlanStatus::Ready {
        let mut active: test_plan::ActiveModel = plan.into();
        active.status = Set(PlanStatus::InProgress);
        active.updated_at = Set(now);
        active.update(&txn).await?
    } else {
        plan
    };

    txn.commit().await?;

    info!(
        plan_id,
        execution_id = execution.id,
        seeded = plan_cases.len(),
        "Created execution from plan"
    );

    let executor = user::Entity::find_by_id(execution.executor_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Internal("Execution executor not found".into()))?;

    let results_count = plan_cases.len() as u64;
    let response = ExecutionResponse::from_parts(execution, plan, executor.username, results_count);

    Ok((StatusCode::CREATED, Json(response)))
}

fn join_ids(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) async fn find_test_plan<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<test_plan::Model, AppError> {
    test_plan::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test plan not found".into()))
}

pub(crate) async fn find_test_plan_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<test_plan::Model, AppError> {
    test_plan::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Test plan not found".into()))
}

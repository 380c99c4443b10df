use std::cmp;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{test_case, test_plan_case, test_result};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::project::find_project;
use crate::models::shared::{Pagination, escape_like};
use crate::models::test_case::*;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Test Cases",
    operation_id = "createTestCase",
    summary = "Create a new test case",
    request_body = CreateTestCaseRequest,
    responses(
        (status = 201, description = "Test case created", body = TestCaseResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name, project_id = payload.project_id))]
pub async fn create_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTestCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create_test_case(&payload)?;

    let txn = state.db.begin().await?;

    find_project(&txn, payload.project_id).await?;

    let now = chrono::Utc::now();
    let new_case = test_case::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        priority: Set(payload.priority.unwrap_or_default()),
        status: Set(payload.status.unwrap_or_default()),
        steps: Set(payload.steps),
        expected_results: Set(payload.expected_results),
        project_id: Set(payload.project_id),
        creator_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = new_case.insert(&txn).await?;
    txn.commit().await?;

    Ok((StatusCode::CREATED, Json(TestCaseResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Test Cases",
    operation_id = "listTestCases",
    summary = "List test cases with filters and pagination",
    params(TestCaseListQuery),
    responses(
        (status = 200, description = "List of test cases", body = TestCaseListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query))]
pub async fn list_test_cases(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TestCaseListQuery>,
) -> Result<Json<TestCaseListResponse>, AppError> {
    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select = test_case::Entity::find();

    if let Some(pid) = query.project_id {
        select = select.filter(test_case::Column::ProjectId.eq(pid));
    }
    if let Some(status) = query.status {
        select = select.filter(test_case::Column::Status.eq(status));
    }
    if let Some(priority) = query.priority {
        select = select.filter(test_case::Column::Priority.eq(priority));
    }
    if let Some(ref keyword) = query.keyword {
        let term = escape_like(keyword.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(test_case::Column::Name)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by_desc(test_case::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(TestCaseResponse::from)
        .collect();

    Ok(Json(TestCaseListResponse {
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
    tag = "Test Cases",
    operation_id = "getTestCase",
    summary = "Get a test case by ID",
    params(("id" = i32, Path, description = "Test case ID")),
    responses(
        (status = 200, description = "Test case details", body = TestCaseResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_test_case(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TestCaseResponse>, AppError> {
    let model = find_test_case(&state.db, id).await?;
    Ok(Json(model.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Test Cases",
    operation_id = "updateTestCase",
    summary = "Update a test case",
    description = "Partially updates a test case using PATCH semantics — only provided fields are modified.",
    params(("id" = i32, Path, description = "Test case ID")),
    request_body = UpdateTestCaseRequest,
    responses(
        (status = 200, description = "Test case updated", body = TestCaseResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(id))]
pub async fn update_test_case(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateTestCaseRequest>,
) -> Result<Json<TestCaseResponse>, AppError> {
    validate_update_test_case(&payload)?;

    if payload == UpdateTestCaseRequest::default() {
        let existing = find_test_case(&state.db, id).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;

    let existing = find_test_case(&txn, id).await?;
    let mut active: test_case::ActiveModel = existing.into();

    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    match payload.description {
        Some(Some(desc)) => active.description = Set(Some(desc)),
        Some(None) => active.description = Set(None),
        None => {}
    }
    if let Some(priority) = payload.priority {
        active.priority = Set(priority);
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    if let Some(steps) = payload.steps {
        active.steps = Set(steps);
    }
    if let Some(expected) = payload.expected_results {
        active.expected_results = Set(expected);
    }
    active.updated_at = Set(chrono::Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Test Cases",
    operation_id = "deleteTestCase",
    summary = "Delete a test case",
    description = "Permanently deletes a test case together with its plan associations and recorded \
        results. Requires staff.",
    params(("id" = i32, Path, description = "Test case ID")),
    responses(
        (status = 204, description = "Test case deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Test case not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_test_case(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;

    find_test_case(&txn, id).await?;

    test_result::Entity::delete_many()
        .filter(test_result::Column::CaseId.eq(id))
        .exec(&txn)
        .await?;

    test_plan_case::Entity::delete_many()
        .filter(test_plan_case::Column::CaseId.eq(id))
        .exec(&txn)
        .await?;

    test_case::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn find_test_case<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<test_case::Model, AppError> {
    test_case::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Test case not found".into()))
}

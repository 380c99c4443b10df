use std::cmp;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, Query as SeaQuery};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{
    project, report, test_case, test_execution, test_plan, test_plan_case, test_result,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::project::*;
use crate::models::shared::{Pagination, escape_like};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Projects",
    operation_id = "createProject",
    summary = "Create a new project",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name))]
pub async fn create_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_create_project(&payload)?;

    let now = chrono::Utc::now();
    let new_project = project::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        status: Set(payload.status.unwrap_or_default()),
        creator_id: Set(auth_user.user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = new_project.insert(&state.db).await?;

    Ok((StatusCode::CREATED, Json(ProjectResponse::from(model))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Projects",
    operation_id = "listProjects",
    summary = "List projects with pagination and search",
    params(ProjectListQuery),
    responses(
        (status = 200, description = "List of projects", body = ProjectListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, query))]
pub async fn list_projects(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut select = project::Entity::find();

    if let Some(status) = query.status {
        select = select.filter(project::Column::Status.eq(status));
    }
    if let Some(ref keyword) = query.keyword {
        let term = escape_like(keyword.trim());
        if !term.is_empty() {
            let pattern = format!("%{}%", term.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(project::Column::Name)))
                            .like(LikeExpr::new(pattern.clone()).escape('\\')),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(project::Column::Description)))
                            .like(LikeExpr::new(pattern).escape('\\')),
                    ),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let total_pages = total.div_ceil(per_page);

    let data = select
        .order_by_desc(project::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(ProjectResponse::from)
        .collect();

    Ok(Json(ProjectListResponse {
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
    tag = "Projects",
    operation_id = "getProject",
    summary = "Get a project by ID",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project details", body = ProjectResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_project(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProjectResponse>, AppError> {
    let model = find_project(&state.db, id).await?;
    Ok(Json(model.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Projects",
    operation_id = "updateProject",
    summary = "Update an existing project",
    description = "Partially updates a project using PATCH semantics — only provided fields are modified.",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, payload), fields(id))]
pub async fn update_project(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    validate_update_project(&payload)?;

    if payload == UpdateProjectRequest::default() {
        let existing = find_project(&state.db, id).await?;
        return Ok(Json(existing.into()));
    }

    let txn = state.db.begin().await?;

    let existing = find_project(&txn, id).await?;
    let mut active: project::ActiveModel = existing.into();

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
    active.updated_at = Set(chrono::Utc::now());

    let model = active.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Projects",
    operation_id = "deleteProject",
    summary = "Delete a project",
    description = "Permanently deletes a project and cascade-deletes its test cases and test plans, \
        including plan associations, executions, results and report records. Requires staff.",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_project(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;

    find_project_for_update(&txn, id).await?;

    // Executions of this project's plans, as a reusable subquery.
    let executions_of_project = SeaQuery::select()
        .column(test_execution::Column::Id)
        .from(test_execution::Entity)
        .and_where(
            test_execution::Column::PlanId.in_subquery(
                SeaQuery::select()
                    .column(test_plan::Column::Id)
                    .from(test_plan::Entity)
                    .and_where(test_plan::Column::ProjectId.eq(id))
                    .to_owned(),
            ),
        )
        .to_owned();

    let cases_of_project = SeaQuery::select()
        .column(test_case::Column::Id)
        .from(test_case::Entity)
        .and_where(test_case::Column::ProjectId.eq(id))
        .to_owned();

    // Results may reference this project's cases from other projects' plans,
    // so both conditions are needed.
    test_result::Entity::delete_many()
        .filter(
            Condition::any()
                .add(test_result::Column::ExecutionId.in_subquery(executions_of_project.clone()))
                .add(test_result::Column::CaseId.in_subquery(cases_of_project.clone())),
        )
        .exec(&txn)
        .await?;

    report::Entity::delete_many()
        .filter(report::Column::ExecutionId.in_subquery(executions_of_project.clone()))
        .exec(&txn)
        .await?;

    test_execution::Entity::delete_many()
        .filter(test_execution::Column::Id.in_subquery(executions_of_project))
        .exec(&txn)
        .await?;

    test_plan_case::Entity::delete_many()
        .filter(
            Condition::any()
                .add(
                    test_plan_case::Column::PlanId.in_subquery(
                        SeaQuery::select()
                            .column(test_plan::Column::Id)
                            .from(test_plan::Entity)
                            .and_where(test_plan::Column::ProjectId.eq(id))
                            .to_owned(),
                    ),
                )
                .add(test_plan_case::Column::CaseId.in_subquery(cases_of_project)),
        )
        .exec(&txn)
        .await?;

    test_plan::Entity::delete_many()
        .filter(test_plan::Column::ProjectId.eq(id))
        .exec(&txn)
        .await?;

    test_case::Entity::delete_many()
        .filter(test_case::Column::ProjectId.eq(id))
        .exec(&txn)
        .await?;

    project::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn find_project<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<project::Model, AppError> {
    project::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))
}

async fn find_project_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<project::Model, AppError> {
    use sea_orm::sea_query::LockType;
    project::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))
}

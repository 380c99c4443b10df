use chrono::{DateTime, Utc};
use common::{CasePriority, CaseStatus, PlanStatus};
use serde::{Deserialize, Serialize};

use crate::entity::test_plan;
use crate::error::AppError;
use crate::models::shared::{Pagination, double_option, validate_bulk_ids, validate_name};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateTestPlanRequest {
    #[schema(example = "Release 2.4 regression")]
    pub name: String,
    pub project_id: i32,
    pub description: Option<String>,
    /// Defaults to `draft`.
    pub status: Option<PlanStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Default, PartialEq, Deserialize, utoipa::ToSchema)]
pub struct UpdateTestPlanRequest {
    pub name: Option<String>,
    /// Omit to leave unchanged, null to clear.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub description: Option<Option<String>>,
    pub status: Option<PlanStatus>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub start_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub end_time: Option<Option<DateTime<Utc>>>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestPlanResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub status: PlanStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub project_id: i32,
    pub creator_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<test_plan::Model> for TestPlanResponse {
    fn from(m: test_plan::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            status: m.status,
            start_time: m.start_time,
            end_time: m.end_time,
            project_id: m.project_id,
            creator_id: m.creator_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// One planned case in a detail response, in execution order.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PlannedCaseItem {
    pub case_id: i32,
    pub name: String,
    pub priority: CasePriority,
    pub status: CaseStatus,
    /// Execution order within the plan; not necessarily contiguous.
    pub order: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestPlanDetailResponse {
    #[serde(flatten)]
    pub plan: TestPlanResponse,
    pub test_cases: Vec<PlannedCaseItem>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct TestPlanListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub project_id: Option<i32>,
    pub status: Option<PlanStatus>,
    /// Case-insensitive substring match on name and description.
    pub keyword: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestPlanListResponse {
    pub data: Vec<TestPlanResponse>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AddTestCasesRequest {
    pub case_ids: Vec<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AddTestCasesResponse {
    pub message: String,
    /// Number of associations actually created.
    pub added: usize,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct RemoveTestCaseQuery {
    pub case_id: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CaseOrderItem {
    pub case_id: i32,
    pub order: i32,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ReorderTestCasesRequest {
    pub case_orders: Vec<CaseOrderItem>,
}

pub fn validate_create_test_plan(payload: &CreateTestPlanRequest) -> Result<(), AppError> {
    validate_name(&payload.name)
}

pub fn validate_update_test_plan(payload: &UpdateTestPlanRequest) -> Result<(), AppError> {
    if let Some(ref name) = payload.name {
        validate_name(name)?;
    }
    Ok(())
}

pub fn validate_add_test_cases(payload: &AddTestCasesRequest) -> Result<(), AppError> {
    validate_bulk_ids(&payload.case_ids, "case_ids", 1000)
}

pub fn validate_reorder_test_cases(payload: &ReorderTestCasesRequest) -> Result<(), AppError> {
    let ids: Vec<i32> = payload.case_orders.iter().map(|o| o.case_id).collect();
    validate_bulk_ids(&ids, "case_orders", 1000)
}

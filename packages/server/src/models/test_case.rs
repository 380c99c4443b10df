use chrono::{DateTime, Utc};
use common::{CasePriority, CaseStatus};
use serde::{Deserialize, Serialize};

use crate::entity::test_case;
use crate::error::AppError;
use crate::models::shared::{Pagination, double_option, validate_name};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateTestCaseRequest {
    #[schema(example = "Login with valid credentials")]
    pub name: String,
    pub project_id: i32,
    pub description: Option<String>,
    /// Defaults to `P2`.
    pub priority: Option<CasePriority>,
    /// Defaults to `draft`.
    pub status: Option<CaseStatus>,
    pub steps: String,
    pub expected_results: String,
}

#[derive(Default, PartialEq, Deserialize, utoipa::ToSchema)]
pub struct UpdateTestCaseRequest {
    pub name: Option<String>,
    /// Omit to leave unchanged, null to clear.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub description: Option<Option<String>>,
    pub priority: Option<CasePriority>,
    pub status: Option<CaseStatus>,
    pub steps: Option<String>,
    pub expected_results: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestCaseResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub priority: CasePriority,
    pub status: CaseStatus,
    pub steps: String,
    pub expected_results: String,
    pub project_id: i32,
    pub creator_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<test_case::Model> for TestCaseResponse {
    fn from(m: test_case::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            priority: m.priority,
            status: m.status,
            steps: m.steps,
            expected_results: m.expected_results,
            project_id: m.project_id,
            creator_id: m.creator_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct TestCaseListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub project_id: Option<i32>,
    pub status: Option<CaseStatus>,
    pub priority: Option<CasePriority>,
    /// Case-insensitive substring match on name.
    pub keyword: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TestCaseListResponse {
    pub data: Vec<TestCaseResponse>,
    pub pagination: Pagination,
}

pub fn validate_create_test_case(payload: &CreateTestCaseRequest) -> Result<(), AppError> {
    validate_name(&payload.name)?;
    if payload.steps.trim().is_empty() {
        return Err(AppError::Validation("Steps must not be empty".into()));
    }
    if payload.expected_results.trim().is_empty() {
        return Err(AppError::Validation(
            "Expected results must not be empty".into(),
        ));
    }
    Ok(())
}

pub fn validate_update_test_case(payload: &UpdateTestCaseRequest) -> Result<(), AppError> {
    if let Some(ref name) = payload.name {
        validate_name(name)?;
    }
    if let Some(ref steps) = payload.steps
        && steps.trim().is_empty()
    {
        return Err(AppError::Validation("Steps must not be empty".into()));
    }
    if let Some(ref expected) = payload.expected_results
        && expected.trim().is_empty()
    {
        return Err(AppError::Validation(
            "Expected results must not be empty".into(),
        ));
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use common::{CasePriority, ResultStatus};
use serde::{Deserialize, Serialize};

use crate::entity::{test_case, test_result};
use crate::error::AppError;
use crate::models::shared::double_option;

/// Brief case info nested inside a result.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CaseBrief {
    pub id: i32,
    pub name: String,
    pub priority: CasePriority,
    pub expected_results: String,
}

impl From<test_case::Model> for CaseBrief {
    fn from(m: test_case::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            priority: m.priority,
            expected_results: m.expected_results,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ResultResponse {
    pub id: i32,
    pub execution_id: i32,
    pub case_id: i32,
    pub case: Option<CaseBrief>,
    pub status: ResultStatus,
    pub actual_result: Option<String>,
    pub remarks: Option<String>,
    pub executor_id: Option<i32>,
    pub executor_name: Option<String>,
    pub execution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultResponse {
    pub fn from_parts(
        result: test_result::Model,
        case: Option<test_case::Model>,
        executor_name: Option<String>,
    ) -> Self {
        Self {
            id: result.id,
            execution_id: result.execution_id,
            case_id: result.case_id,
            case: case.map(CaseBrief::from),
            status: result.status,
            actual_result: result.actual_result,
            remarks: result.remarks,
            executor_id: result.executor_id,
            executor_name,
            execution_time: result.execution_time,
            created_at: result.created_at,
            updated_at: result.updated_at,
        }
    }
}

#[derive(Default, PartialEq, Deserialize, utoipa::ToSchema)]
pub struct UpdateResultRequest {
    pub status: Option<ResultStatus>,
    /// Omit to leave unchanged, null to clear.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub actual_result: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub remarks: Option<Option<String>>,
}

/// One item of a batch update. Absent fields are left unchanged.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct BatchUpdateItem {
    pub id: i32,
    pub status: Option<ResultStatus>,
    pub remarks: Option<String>,
    pub actual_result: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct BatchUpdateRequest {
    pub results: Vec<BatchUpdateItem>,
}

/// Per-item failure inside a batch update.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BatchUpdateError {
    pub id: i32,
    pub message: String,
}

/// Batch responses report partial success: the count of applied updates
/// plus one error entry per failed item.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BatchUpdateResponse {
    pub message: String,
    pub updated_count: usize,
    pub errors: Vec<BatchUpdateError>,
}

pub fn validate_batch_update(payload: &BatchUpdateRequest) -> Result<(), AppError> {
    if payload.results.is_empty() {
        return Err(AppError::Validation(
            "results must be a non-empty list".into(),
        ));
    }
    if payload.results.len() > 1000 {
        return Err(AppError::Validation("Too many results: max 1000".into()));
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use common::{ExecutionStatus, PlanStatus, ReportType, ResultStatus};
use serde::{Deserialize, Serialize};

use crate::entity::{test_execution, test_plan};
use crate::models::result::ResultResponse;
use crate::models::shared::Pagination;

/// Plan info nested inside an execution response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PlanNested {
    pub id: i32,
    pub name: String,
    pub project_id: i32,
    pub status: PlanStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<test_plan::Model> for PlanNested {
    fn from(m: test_plan::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            project_id: m.project_id,
            status: m.status,
            start_time: m.start_time,
            end_time: m.end_time,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ExecutionResponse {
    pub id: i32,
    pub plan_id: i32,
    pub plan_name: String,
    pub plan_detail: Option<PlanNested>,
    pub executor_id: i32,
    pub executor_name: String,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of results seeded for this execution.
    pub results_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionResponse {
    pub fn from_parts(
        execution: test_execution::Model,
        plan: test_plan::Model,
        executor_name: String,
        results_count: u64,
    ) -> Self {
        Self {
            id: execution.id,
            plan_id: execution.plan_id,
            plan_name: plan.name.clone(),
            plan_detail: Some(PlanNested::from(plan)),
            executor_id: execution.executor_id,
            executor_name,
            status: execution.status,
            start_time: execution.start_time,
            end_time: execution.end_time,
            results_count,
            created_at: execution.created_at,
            updated_at: execution.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ExecutionListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Case-insensitive substring match on the plan name.
    pub plan_name: Option<String>,
    pub status: Option<ExecutionStatus>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ExecutionListResponse {
    pub data: Vec<ExecutionResponse>,
    pub pagination: Pagination,
}

/// Body for `complete`. All fields optional; an empty object is valid.
#[derive(Default, Deserialize, utoipa::ToSchema)]
pub struct CompleteExecutionRequest {
    /// Enqueue a report job on completion. Defaults to the server config.
    pub auto_generate_report: Option<bool>,
    /// Report type for the auto-generated report. Defaults to `allure`.
    pub report_type: Option<ReportType>,
}

/// Response for state transition endpoints.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TransitionResponse {
    pub message: String,
    /// Report job handle, present when `complete` enqueued a report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ResultListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Case-insensitive substring match on the case name.
    pub case_name: Option<String>,
    pub status: Option<ResultStatus>,
}

/// Status breakdown over the whole filtered result set (not just the page).
#[derive(Default, Serialize, utoipa::ToSchema)]
pub struct ResultStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub blocked: u64,
    pub skipped: u64,
    pub pending: u64,
}

impl ResultStats {
    /// Accumulate a (status, count) aggregation row.
    pub fn record(&mut self, status: ResultStatus, count: u64) {
        self.total += count;
        match status {
            ResultStatus::Pending => self.pending += count,
            ResultStatus::Passed => self.passed += count,
            ResultStatus::Failed => self.failed += count,
            ResultStatus::Blocked => self.blocked += count,
            ResultStatus::Skipped => self.skipped += count,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ExecutionResultsResponse {
    pub data: Vec<ResultResponse>,
    pub pagination: Pagination,
    pub stats: ResultStats,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{ExecutionStatus, ReportType, ResultStatus};

/// Snapshot of the execution a report is generated for.
///
/// The server resolves all display fields at enqueue time so the worker
/// never needs database access.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// Execution the report describes.
    pub execution_id: i32,
    /// Name of the plan the execution ran against (Allure suite label).
    pub plan_name: String,
    /// Username of the executor.
    pub executor_name: String,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Snapshot of one test result included in a report job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub case_id: i32,
    pub case_name: String,
    pub status: ResultStatus,
    pub actual_result: Option<String>,
    pub remarks: Option<String>,
    /// When the result left `pending`, if it has.
    pub execution_time: Option<DateTime<Utc>>,
    /// Last modification; used as the Allure stop timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A report-generation job message sent to the worker queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportJob {
    /// Job identifier (UUID), returned to the caller as the task handle.
    pub job_id: String,
    /// Artifact type requested by the caller.
    pub report_type: ReportType,
    /// Display name for the persisted report.
    pub name: String,
    pub description: String,
    /// User that triggered generation; becomes the report creator.
    pub requested_by: i32,
    pub execution: ExecutionInfo,
    pub results: Vec<ResultSnapshot>,
}

impl ReportJob {
    /// Create a new report job with a generated UUID.
    pub fn new(
        report_type: ReportType,
        name: String,
        description: String,
        requested_by: i32,
        execution: ExecutionInfo,
        results: Vec<ResultSnapshot>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            report_type,
            name,
            description,
            requested_by,
            execution,
            results,
        }
    }
}

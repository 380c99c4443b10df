use serde::{Deserialize, Serialize};

use crate::report_job::ReportJob;
use crate::status::ReportType;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportErrorInfo {
    /// Machine-readable error code (e.g., "IO_ERROR", "RENDER_ERROR").
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}

impl ReportErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result from the worker after a report-generation job.
///
/// The server-side consumer persists a `Report` row only when `error_info`
/// is `None`; a failed job produces no report record.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReportOutcome {
    /// Original job ID.
    pub job_id: String,
    /// Execution the report was generated for.
    pub execution_id: i32,
    /// Final artifact type. May be downgraded (allure → html) when the
    /// external toolchain is unavailable.
    pub report_type: ReportType,
    /// Path of the produced file or directory (None on failure).
    pub file_path: Option<String>,
    pub name: String,
    pub description: String,
    /// User that triggered generation.
    pub requested_by: i32,
    /// Structured error info when the job failed.
    pub error_info: Option<ReportErrorInfo>,
}

impl ReportOutcome {
    /// Create an outcome indicating the job failed without producing an artifact.
    pub fn failure(job: &ReportJob, error_info: ReportErrorInfo) -> Self {
        Self {
            job_id: job.job_id.clone(),
            execution_id: job.execution.execution_id,
            report_type: job.report_type,
            file_path: None,
            name: job.name.clone(),
            description: job.description.clone(),
            requested_by: job.requested_by,
            error_info: Some(error_info),
        }
    }
}

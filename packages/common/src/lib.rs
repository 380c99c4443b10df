pub mod config;
pub mod report_job;
pub mod report_outcome;
pub mod status;
pub mod worker;

pub use status::{
    CasePriority, CaseStatus, ExecutionStatus, PlanStatus, ProjectStatus, ReportType, ResultStatus,
};

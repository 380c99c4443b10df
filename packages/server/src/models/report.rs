use chrono::{DateTime, Utc};
use common::ReportType;
use serde::{Deserialize, Serialize};

use crate::entity::report;
use crate::error::AppError;
use crate::models::shared::{Pagination, double_option, validate_name};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct GenerateReportRequest {
    pub execution_id: i32,
    /// Defaults to `allure`.
    pub report_type: Option<ReportType>,
    /// Defaults to "<plan name> - Test Report - <timestamp>".
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerateReportResponse {
    pub message: String,
    /// Job handle; the report row appears once the worker finishes.
    pub task_id: String,
}

#[derive(Default, PartialEq, Deserialize, utoipa::ToSchema)]
pub struct UpdateReportRequest {
    pub name: Option<String>,
    /// Omit to leave unchanged, null to clear.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(nullable)]
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ReportResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub execution_id: i32,
    pub report_type: ReportType,
    pub file_path: String,
    pub is_public: bool,
    pub creator_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<report::Model> for ReportResponse {
    fn from(m: report::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            execution_id: m.execution_id,
            report_type: m.report_type,
            file_path: m.file_path,
            is_public: m.is_public,
            creator_id: m.creator_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ReportListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Case-insensitive substring match on name.
    pub keyword: Option<String>,
    pub execution_id: Option<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ReportListResponse {
    pub data: Vec<ReportResponse>,
    pub pagination: Pagination,
}

pub fn validate_generate_report(payload: &GenerateReportRequest) -> Result<(), AppError> {
    if let Some(ref name) = payload.name {
        validate_name(name)?;
    }
    Ok(())
}

pub fn validate_update_report(payload: &UpdateReportRequest) -> Result<(), AppError> {
    if let Some(ref name) = payload.name {
        validate_name(name)?;
    }
    Ok(())
}

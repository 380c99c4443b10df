use common::ReportType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A rendered report artifact.
///
/// Rows are inserted only by the report-outcome consumer after the worker
/// has produced the artifact; afterwards only metadata is editable.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub execution_id: i32,
    #[sea_orm(belongs_to, from = "execution_id", to = "id")]
    pub execution: HasOne<super::test_execution::Entity>,

    pub report_type: ReportType,
    /// Absolute path of the produced file (html) or directory (allure).
    pub file_path: String,
    pub is_public: bool,

    /// Generation job that produced this row; deduplicates at-least-once
    /// outcome delivery.
    #[sea_orm(unique)]
    pub job_id: String,

    pub creator_id: i32,
    #[sea_orm(belongs_to, from = "creator_id", to = "id")]
    pub creator: HasOne<super::user::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

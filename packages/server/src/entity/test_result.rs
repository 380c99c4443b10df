use common::ResultStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "test_result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "execution_case")]
    pub execution_id: i32,
    #[sea_orm(unique_key = "execution_case")]
    pub case_id: i32,

    pub status: ResultStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub actual_result: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub remarks: Option<String>,

    /// Stamped by the server on the first transition away from `pending`.
    pub executor_id: Option<i32>,
    #[sea_orm(belongs_to, from = "executor_id", to = "id")]
    pub executor: HasOne<super::user::Entity>,

    /// Stamped together with `executor_id`.
    pub execution_time: Option<DateTimeUtc>,

    #[sea_orm(belongs_to, from = "execution_id", to = "id")]
    pub execution: HasOne<super::test_execution::Entity>,
    #[sea_orm(belongs_to, from = "case_id", to = "id")]
    pub case: HasOne<super::test_case::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

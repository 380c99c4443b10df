use common::ExecutionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "test_execution")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Referenced, not owned: many executions may run against one plan.
    pub plan_id: i32,
    #[sea_orm(belongs_to, from = "plan_id", to = "id")]
    pub plan: HasOne<super::test_plan::Entity>,

    pub executor_id: i32,
    #[sea_orm(belongs_to, from = "executor_id", to = "id")]
    pub executor: HasOne<super::user::Entity>,

    pub status: ExecutionStatus,
    /// Set on the first `start`; preserved across pause/resume.
    pub start_time: Option<DateTimeUtc>,
    pub end_time: Option<DateTimeUtc>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::test_result::Entity>,
    #[sea_orm(has_many)]
    pub reports: HasMany<super::report::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

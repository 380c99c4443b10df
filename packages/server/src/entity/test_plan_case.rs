use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Association between a plan and a case, carrying the execution order.
/// `position` need not be contiguous; it only defines the sequence.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "test_plan_case")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "plan_case")]
    pub plan_id: i32,
    #[sea_orm(unique_key = "plan_case")]
    pub case_id: i32,

    pub position: i32,

    #[sea_orm(belongs_to, from = "plan_id", to = "id")]
    pub plan: HasOne<super::test_plan::Entity>,
    #[sea_orm(belongs_to, from = "case_id", to = "id")]
    pub case: HasOne<super::test_case::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}

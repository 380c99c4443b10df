use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    /// None when MQ is disabled; report generation is then unavailable.
    pub mq: Option<Arc<mq::Mq>>,
}

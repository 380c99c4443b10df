use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    /// Unique identifier for this worker instance. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Number of jobs processed concurrently. Default: 4.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_batch_size() -> usize {
    4
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            batch_size: default_batch_size(),
        }
    }
}

/// Where report artifacts go and how the Allure toolchain is invoked.
#[derive(Debug, Deserialize, Clone)]
pub struct ReportSettings {
    /// Directory report artifacts are written under. Default: "./reports".
    #[serde(default = "default_reports_dir")]
    pub dir: String,
    /// Allure executable path. Default: "allure".
    #[serde(default = "default_allure_bin")]
    pub allure_bin: String,
}

fn default_reports_dir() -> String {
    "./reports".into()
}
fn default_allure_bin() -> String {
    "allure".into()
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
            allure_bin: default_allure_bin(),
        }
    }
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub report: ReportSettings,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("TRELLIS_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("TRELLIS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

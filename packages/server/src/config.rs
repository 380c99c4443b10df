use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Token lifetime in days. Default: 7.
    #[serde(default = "default_token_days")]
    pub token_days: i64,
}

fn default_token_days() -> i64 {
    7
}

/// Report-generation behaviour on execution completion.
#[derive(Debug, Deserialize, Clone)]
pub struct ReportAppConfig {
    /// Enqueue a report job automatically when an execution completes,
    /// unless the request says otherwise. Default: true.
    #[serde(default = "default_auto_generate")]
    pub auto_generate: bool,
}

fn default_auto_generate() -> bool {
    true
}

impl Default for ReportAppConfig {
    fn default() -> Self {
        Self {
            auto_generate: default_auto_generate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub report: ReportAppConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., TRELLIS__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("TRELLIS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

//! API configuration

use std::time::Duration;

use serde::Deserialize;

use infra_db::DatabaseConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Upper bound of pooled database connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// Seconds a request waits for a pooled connection
    pub acquire_timeout_secs: u32,
    /// Log level or `EnvFilter` directive
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/posting".to_string(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 30,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables
    ///
    /// Unset keys keep their defaults. A plain `DATABASE_URL` wins over
    /// `API_DATABASE_URL`.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("database_url", defaults.database_url)?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("min_connections", i64::from(defaults.min_connections))?
            .set_default("acquire_timeout_secs", i64::from(defaults.acquire_timeout_secs))?
            .set_default("log_level", defaults.log_level)?
            .set_default("json_logs", defaults.json_logs)?
            .add_source(config::Environment::with_prefix("API"))
            .set_override_option("database_url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pool settings for the posting store
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(u64::from(self.acquire_timeout_secs)))
    }
}

use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub backend_url: String,
    pub cache_path: String,
    pub session_path: String,
    pub auth_storage_key: String,
    pub mutation_debounce_ms: u64,
    pub plan_debounce_ms: u64,
    pub pending_plan_attempts: u32,
    pub request_timeout_ms: u64,
}

impl AppConfig {
    /// Defaults, then `.env`, then the process environment (`__` separates
    /// nested keys).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::defaults()?
            .add_source(config::Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Defaults with explicit overrides and no environment lookup.
    pub fn from_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }
        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("backend_url", "http://127.0.0.1:8090")?
            .set_default("cache_path", "dictionaries.sqlite3")?
            .set_default("session_path", "session.json")?
            .set_default("auth_storage_key", "pocketbase_auth")?
            .set_default("mutation_debounce_ms", 450)?
            .set_default("plan_debounce_ms", 750)?
            .set_default("pending_plan_attempts", 3)?
            .set_default("request_timeout_ms", 30000)
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn plan_debounce(&self) -> Duration {
        Duration::from_millis(self.plan_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::error::{PlanSyncError, Result};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(config.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.is_production() {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
    };

    installed.map_err(|e| PlanSyncError::Internal(format!("tracing init failed: {e}")))
}

pub mod config;
pub mod error;

pub use config::{CacheConfig, Config, LocationConfig, StorageConfig, ValidationResult, WeatherConfig};
pub use error::{
    AppError, ForecastError, LocationError, NetworkError, PersistenceError, RecoveryAction,
    ReqwestErrorExt,
};

use anyhow::Result;

/// Initialize logging for the weather dashboard
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("WeatherDash core initialized");
    Ok(())
}

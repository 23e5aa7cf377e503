use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_DIR: &str = "weatherdash";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider endpoints and request settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Staleness windows per use site
    #[serde(default)]
    pub cache: CacheConfig,

    /// Fallback location and device geolocation settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Durable store location
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Open-Meteo forecast API host
    pub forecast_url: String,

    /// Open-Meteo geocoding API host (forward search)
    pub geocoding_url: String,

    /// Nominatim host (reverse geocoding)
    pub reverse_geocoding_url: String,

    /// National Weather Service API host (severe alerts)
    pub alerts_url: String,

    /// Descriptive User-Agent, required by NWS and Nominatim
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Decimal places kept when coordinates become cache keys or request params
    pub coordinate_precision: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com".to_string(),
            geocoding_url: "https://geocoding-api.open-meteo.com".to_string(),
            reverse_geocoding_url: "https://nominatim.openstreetmap.org".to_string(),
            alerts_url: "https://api.weather.gov".to_string(),
            user_agent: "WeatherDash/0.1.0 (https://github.com/weatherdash/weatherdash)".to_string(),
            request_timeout_secs: 15,
            coordinate_precision: 4,
        }
    }
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Foreground dashboard weather
    pub dashboard_stale_secs: u64,
    /// Background-prefetched picker previews
    pub preview_stale_secs: u64,
    /// Reverse-geocoded place names
    pub reverse_geocode_stale_secs: u64,
    /// Severe weather alerts
    pub alerts_stale_secs: u64,
    /// Forward geocoding search results
    pub search_stale_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dashboard_stale_secs: 2 * 60,
            preview_stale_secs: 10 * 60,
            reverse_geocode_stale_secs: 60 * 60,
            alerts_stale_secs: 2 * 60,
            search_stale_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn dashboard_stale(&self) -> Duration {
        Duration::from_secs(self.dashboard_stale_secs)
    }

    pub fn preview_stale(&self) -> Duration {
        Duration::from_secs(self.preview_stale_secs)
    }

    pub fn reverse_geocode_stale(&self) -> Duration {
        Duration::from_secs(self.reverse_geocode_stale_secs)
    }

    pub fn alerts_stale(&self) -> Duration {
        Duration::from_secs(self.alerts_stale_secs)
    }

    pub fn search_stale(&self) -> Duration {
        Duration::from_secs(self.search_stale_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Label shown for the static fallback location
    pub fallback_label: String,
    pub fallback_lat: f64,
    pub fallback_lon: f64,

    /// How long a device position request may take
    pub geolocation_timeout_secs: u64,

    /// Oldest device fix that is still acceptable without a new request
    pub max_fix_age_secs: u64,

    /// Device position, when the platform provides one through configuration.
    /// Geolocation is reported unavailable when these are unset.
    pub device_lat: Option<f64>,
    pub device_lon: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fallback_label: "Kansas City, MO, US".to_string(),
            fallback_lat: 39.0997,
            fallback_lon: -94.5786,
            geolocation_timeout_secs: 30,
            max_fix_age_secs: 10 * 60,
            device_lat: None,
            device_lon: None,
        }
    }
}

impl LocationConfig {
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn max_fix_age(&self) -> Duration {
        Duration::from_secs(self.max_fix_age_secs)
    }

    /// Configured device position as `(lat, lon)`, if both halves are set
    pub fn device_position(&self) -> Option<(f64, f64)> {
        match (self.device_lat, self.device_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding saved cities, recent searches and the active location
    pub path: Option<PathBuf>,

    /// How often to look for writes made by another running instance
    pub external_sync_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            external_sync_secs: 5,
        }
    }
}

impl StorageConfig {
    pub fn external_sync_period(&self) -> Duration {
        Duration::from_secs(self.external_sync_secs.max(1))
    }

    /// Effective database path (configured path, else the app config dir)
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join("weatherdash.db")),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.forecast_url, "weather.forecast_url", &mut result);
        self.validate_url(&self.weather.geocoding_url, "weather.geocoding_url", &mut result);
        self.validate_url(
            &self.weather.reverse_geocoding_url,
            "weather.reverse_geocoding_url",
            &mut result,
        );
        self.validate_url(&self.weather.alerts_url, "weather.alerts_url", &mut result);

        if self.weather.user_agent.trim().is_empty() {
            result.add_error(
                "weather.user_agent",
                "User agent is required by the alerts provider",
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error("weather.request_timeout_secs", "Timeout must be greater than 0");
        } else if self.weather.request_timeout_secs > 120 {
            result.add_warning(
                "weather.request_timeout_secs",
                "Request timeout is unusually long (>120s)",
            );
        }

        if self.weather.coordinate_precision > 6 {
            result.add_warning(
                "weather.coordinate_precision",
                "More than 6 decimals fragments the cache without adding accuracy",
            );
        }

        if !valid_lat(self.location.fallback_lat) {
            result.add_error("location.fallback_lat", "Latitude must be within -90..=90");
        }
        if !valid_lon(self.location.fallback_lon) {
            result.add_error("location.fallback_lon", "Longitude must be within -180..=180");
        }
        if self.location.fallback_label.trim().is_empty() {
            result.add_error("location.fallback_label", "Fallback label must not be empty");
        }

        match (self.location.device_lat, self.location.device_lon) {
            (Some(lat), Some(lon)) => {
                if !valid_lat(lat) || !valid_lon(lon) {
                    result.add_error("location.device_lat", "Device position is out of range");
                }
            }
            (None, None) => {}
            _ => result.add_warning(
                "location.device_lat",
                "Only one of device_lat/device_lon is set; geolocation disabled",
            ),
        }

        if self.cache.dashboard_stale_secs == 0 {
            result.add_warning(
                "cache.dashboard_stale_secs",
                "Dashboard weather is refetched on every view (0 seconds)",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Application configuration directory
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir)
    }
}

fn valid_lat(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

fn valid_lon(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.weather.forecast_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.forecast_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.alerts_url = "ftp://api.weather.gov".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_empty_user_agent_is_error() {
        let mut config = Config::default();
        config.weather.user_agent = "  ".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.user_agent"));
    }

    #[test]
    fn test_out_of_range_fallback() {
        let mut config = Config::default();
        config.location.fallback_lat = 123.0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "location.fallback_lat"));
    }

    #[test]
    fn test_half_device_position_is_warning() {
        let mut config = Config::default();
        config.location.device_lat = Some(41.0);
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "location.device_lat"));
        assert_eq!(config.location.device_position(), None);
    }

    #[test]
    fn test_defaults_match_documented_windows() {
        let config = Config::default();
        assert_eq!(config.cache.dashboard_stale(), Duration::from_secs(120));
        assert_eq!(config.cache.preview_stale(), Duration::from_secs(600));
        assert_eq!(config.cache.reverse_geocode_stale(), Duration::from_secs(3600));
        assert_eq!(config.weather.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.location.geolocation_timeout(), Duration::from_secs(30));
        assert_eq!(config.location.max_fix_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.location.fallback_label, "Kansas City, MO, US");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[location]\nfallback_label = \"Chicago, IL, US\"\nfallback_lat = 41.8781\nfallback_lon = -87.6298\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.location.fallback_label, "Chicago, IL, US");
        assert_eq!(config.location.geolocation_timeout_secs, 30);
        assert_eq!(config.weather.request_timeout_secs, 15);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}

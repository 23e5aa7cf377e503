//! Weather crate error types.

use thiserror::Error;
use weatherdash_core::{AppError, ForecastError, NetworkError, ReqwestErrorExt};

use crate::cache::LoadAbandoned;

/// Fetch failures.
///
/// `Clone` so one failed load can be handed to every caller sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Saved city not found: {0}")]
    CityNotFound(String),

    #[error("Request ended before producing a result")]
    Interrupted,
}

impl WeatherError {
    /// Whether trying again might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            WeatherError::Network(_) | WeatherError::Timeout | WeatherError::Interrupted => true,
            WeatherError::Http { status } => *status >= 500 || *status == 429,
            WeatherError::Parse(_) | WeatherError::CityNotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        match e.into_network_error() {
            NetworkError::Timeout => WeatherError::Timeout,
            NetworkError::Status { status, .. } => WeatherError::Http { status },
            NetworkError::Decode(message) => WeatherError::Parse(message),
            NetworkError::ConnectionFailed(message) => WeatherError::Network(message),
        }
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(e: serde_json::Error) -> Self {
        WeatherError::Parse(e.to_string())
    }
}

impl From<LoadAbandoned> for WeatherError {
    fn from(_: LoadAbandoned) -> Self {
        WeatherError::Interrupted
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Network(message) => {
                AppError::Network(NetworkError::ConnectionFailed(message))
            }
            WeatherError::Timeout => AppError::Network(NetworkError::Timeout),
            WeatherError::Http { status } => AppError::Network(NetworkError::Status {
                status,
                message: format!("HTTP {status}"),
            }),
            WeatherError::Parse(message) => AppError::Forecast(ForecastError::Malformed(message)),
            WeatherError::CityNotFound(id) => AppError::Forecast(ForecastError::CityNotFound(id)),
            WeatherError::Interrupted => AppError::Forecast(ForecastError::Interrupted),
        }
    }
}

pub type Result<T> = std::result::Result<T, WeatherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_not_found_surfaces_actionable_message() {
        let app: AppError = WeatherError::CityNotFound("gone".into()).into();
        assert_eq!(
            app.user_message(),
            "This city isn't in your saved list. Search for it again."
        );
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(WeatherError::Http { status: 503 }.is_transient());
        assert!(!WeatherError::Http { status: 404 }.is_transient());
        assert!(!WeatherError::CityNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_timeout_maps_to_network_timeout() {
        let app: AppError = WeatherError::Timeout.into();
        assert!(matches!(app, AppError::Network(NetworkError::Timeout)));
    }
}

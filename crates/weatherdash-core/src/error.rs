//! Application error hierarchy.
//!
//! Soft failures (alerts, reverse geocoding, malformed stored state) never
//! reach this type; they resolve to defaults where they happen. What does
//! reach it is something the user can act on, so every category carries a
//! display message and a suggested next step.

use thiserror::Error;

/// Top-level application error type.
///
/// Crate errors (`StorageError`, the weather crate's `WeatherError`)
/// convert into this.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Message suitable for showing next to the failed view
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Persistence(e) => e.user_message(),
            AppError::Location(e) => e.user_message(),
            AppError::Forecast(e) => e.user_message(),
            AppError::Other(_) => "Something went wrong. Please try again.",
        }
    }

    pub fn suggested_action(&self) -> RecoveryAction {
        match self {
            AppError::Network(_) => RecoveryAction::Retry,
            AppError::Persistence(_) => RecoveryAction::Retry,
            AppError::Location(e) => e.suggested_action(),
            AppError::Forecast(ForecastError::CityNotFound(_)) => RecoveryAction::SearchInstead,
            AppError::Forecast(_) => RecoveryAction::Retry,
            AppError::Other(_) => RecoveryAction::UseFallback,
        }
    }
}

/// Transport failures talking to a provider.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unreadable response: {0}")]
    Decode(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Can't reach the weather service. Check your connection.",
            NetworkError::Timeout => "The weather service took too long to answer.",
            NetworkError::Status { status, .. } if *status == 429 => {
                "Too many requests right now. Wait a moment and retry."
            }
            NetworkError::Status { status, .. } if *status >= 500 => {
                "The weather service is having trouble. Try again shortly."
            }
            NetworkError::Status { .. } => "The weather service rejected the request.",
            NetworkError::Decode(_) => "The weather service sent something unexpected.",
        }
    }
}

/// Durable preference store failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl PersistenceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PersistenceError::Unavailable(_) => "Saved places can't be loaded right now.",
            PersistenceError::WriteFailed(_) | PersistenceError::Serialization(_) => {
                "Your change wasn't saved. Please try again."
            }
        }
    }
}

/// What the UI should offer after a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Trying the same thing again is likely to help
    Retry,
    /// Point the user at city search
    SearchInstead,
    /// Nothing to retry; the fallback location is shown
    UseFallback,
}

/// Device geolocation failures, categorized by cause.
///
/// The category decides whether the UI suggests retrying or searching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Geolocation is not supported on this device")]
    Unsupported,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location unavailable")]
    PositionUnavailable,

    #[error("Location error: {0}")]
    Other(String),
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::Unsupported => "Geolocation is not supported on this device.",
            LocationError::PermissionDenied => {
                "Location permission denied. Search for a city instead."
            }
            LocationError::Timeout => {
                "Location request timed out. Try again, or turn on Wi-Fi / move near a window."
            }
            LocationError::PositionUnavailable => {
                "Location unavailable right now. Try again or use city search."
            }
            LocationError::Other(_) => "Unable to get location.",
        }
    }

    /// Hint shown next to the location control.
    ///
    /// Uncategorized errors carry the platform message when there is one.
    pub fn hint(&self) -> String {
        match self {
            LocationError::Other(message) if !message.trim().is_empty() => message.clone(),
            other => other.user_message().to_string(),
        }
    }

    pub fn suggested_action(&self) -> RecoveryAction {
        match self {
            LocationError::PermissionDenied | LocationError::Unsupported => {
                RecoveryAction::SearchInstead
            }
            LocationError::Timeout | LocationError::PositionUnavailable => RecoveryAction::Retry,
            LocationError::Other(_) => RecoveryAction::UseFallback,
        }
    }
}

/// Forecast failures that aren't transport problems.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Saved city not found: {0}")]
    CityNotFound(String),

    #[error("Malformed forecast: {0}")]
    Malformed(String),

    #[error("Forecast load interrupted")]
    Interrupted,
}

impl ForecastError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ForecastError::CityNotFound(_) => {
                "This city isn't in your saved list. Search for it again."
            }
            ForecastError::Malformed(_) => "The forecast couldn't be read.",
            ForecastError::Interrupted => "Loading the forecast was interrupted.",
        }
    }
}

/// Classify a reqwest failure.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if let Some(status) = self.status() {
            NetworkError::Status {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::Decode(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

//! Device geolocation as an explicit state machine.
//!
//! `idle -> loading -> ready | error`. `ready` and `error` hold until the next
//! `request()`, which always passes back through `loading`. Nothing retries
//! on its own.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use weatherdash_core::{LocationConfig, LocationError};
use weatherdash_storage::Coordinates;

/// Observable adapter state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GeoState {
    #[default]
    Idle,
    Loading,
    Ready(Coordinates),
    Error(LocationError),
}

impl GeoState {
    pub fn coords(&self) -> Option<Coordinates> {
        match self {
            GeoState::Ready(coords) => Some(*coords),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LocationError> {
        match self {
            GeoState::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, GeoState::Loading)
    }

    /// User-facing hint for an error state
    pub fn hint(&self) -> Option<String> {
        self.error().map(LocationError::hint)
    }
}

/// Per-request positioning options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoOptions {
    pub timeout: Duration,
    /// Reuse a previous fix younger than this
    pub max_age: Duration,
    pub high_accuracy: bool,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_age: Duration::from_secs(600),
            high_accuracy: false,
        }
    }
}

impl From<&LocationConfig> for GeoOptions {
    fn from(config: &LocationConfig) -> Self {
        Self {
            timeout: config.geolocation_timeout(),
            max_age: config.max_fix_age(),
            high_accuracy: false,
        }
    }
}

/// Platform positioning capability.
pub trait PositionSource: Send + Sync {
    /// Whether the platform can locate at all
    fn is_available(&self) -> bool;

    fn locate(
        &self,
        options: &GeoOptions,
    ) -> impl Future<Output = Result<Coordinates, LocationError>> + Send;
}

/// A fixed device position from configuration.
///
/// Without one, geolocation is reported unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPosition {
    coords: Option<Coordinates>,
}

impl StaticPosition {
    pub fn new(coords: Option<Coordinates>) -> Self {
        Self { coords }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(config.device_position().map(|(lat, lon)| Coordinates::new(lat, lon)))
    }
}

impl PositionSource for StaticPosition {
    fn is_available(&self) -> bool {
        self.coords.is_some()
    }

    async fn locate(&self, _options: &GeoOptions) -> Result<Coordinates, LocationError> {
        self.coords.ok_or(LocationError::Unsupported)
    }
}

/// Wraps a `PositionSource` with state, timeout and fix reuse.
pub struct GeolocationAdapter<S> {
    source: S,
    options: GeoOptions,
    can_use: bool,
    state: watch::Sender<GeoState>,
    /// Bumped by every request/reset so superseded requests drop their result
    generation: AtomicU64,
    last_fix: Mutex<Option<(Coordinates, Instant)>>,
}

impl<S: PositionSource> GeolocationAdapter<S> {
    pub fn new(source: S, options: GeoOptions) -> Self {
        let can_use = source.is_available();
        Self {
            source,
            options,
            can_use,
            state: watch::Sender::new(GeoState::Idle),
            generation: AtomicU64::new(0),
            last_fix: Mutex::new(None),
        }
    }

    /// Whether positioning is possible; fixed at construction
    pub fn can_use(&self) -> bool {
        self.can_use
    }

    pub fn state(&self) -> GeoState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GeoState> {
        self.state.subscribe()
    }

    /// Ask for a position and return the resulting state.
    pub async fn request(&self) -> GeoState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.can_use {
            return self.publish(generation, GeoState::Error(LocationError::Unsupported));
        }

        self.state.send_replace(GeoState::Loading);

        if let Some(coords) = self.recent_fix() {
            tracing::debug!("Reusing cached position fix");
            return self.publish(generation, GeoState::Ready(coords));
        }

        let outcome = match tokio::time::timeout(self.options.timeout, self.source.locate(&self.options)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LocationError::Timeout),
        };

        let next = match outcome {
            Ok(coords) => {
                if self.generation.load(Ordering::SeqCst) == generation {
                    *self.last_fix.lock() = Some((coords, Instant::now()));
                }
                GeoState::Ready(coords)
            }
            Err(e) => {
                tracing::debug!("Geolocation failed: {}", e);
                GeoState::Error(e)
            }
        };
        self.publish(generation, next)
    }

    /// Back to `idle`; any running request is discarded.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(GeoState::Idle);
    }

    fn recent_fix(&self) -> Option<Coordinates> {
        let last_fix = self.last_fix.lock();
        let (coords, at) = (*last_fix)?;
        (at.elapsed() <= self.options.max_age).then_some(coords)
    }

    fn publish(&self, generation: u64, next: GeoState) -> GeoState {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Dropping superseded geolocation result");
            return self.state();
        }
        self.state.send_replace(next.clone());
        next
    }
}

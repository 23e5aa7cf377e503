//! The caches every fetch goes through, and their key layout.

use std::sync::Arc;

use crate::cache::QueryCache;
use crate::error::WeatherError;
use crate::types::{CandidatePlace, WeatherAlert, WeatherSnapshot};

pub type WeatherCache = QueryCache<Arc<WeatherSnapshot>, WeatherError>;
pub type AlertsCache = QueryCache<Arc<Vec<WeatherAlert>>, WeatherError>;
pub type PlaceCache = QueryCache<Option<CandidatePlace>, WeatherError>;
pub type SearchCache = QueryCache<Arc<Vec<CandidatePlace>>, WeatherError>;

/// One cache per result type; clones share state.
#[derive(Clone, Default)]
pub struct QueryClient {
    pub weather: WeatherCache,
    pub alerts: AlertsCache,
    pub places: PlaceCache,
    pub search: SearchCache,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.weather.clear();
        self.alerts.clear();
        self.places.clear();
        self.search.clear();
    }
}

pub mod keys {
    use weatherdash_storage::Coordinates;

    use crate::cache::QueryKey;

    pub fn weather() -> QueryKey {
        QueryKey::new(["weather"])
    }

    /// `weather:coords:{lat}:{lon}:{label}`
    pub fn weather_coords(coords: Coordinates, label: &str) -> QueryKey {
        weather().with("coords").with_coords(coords).with(label)
    }

    pub fn alerts() -> QueryKey {
        QueryKey::new(["alerts"])
    }

    pub fn alerts_at(coords: Coordinates) -> QueryKey {
        alerts().with_coords(coords)
    }

    pub fn reverse(coords: Coordinates) -> QueryKey {
        QueryKey::new(["reverse"]).with_coords(coords)
    }

    /// Search terms are keyed case-insensitively
    pub fn search(term: &str) -> QueryKey {
        QueryKey::new(["geocode"]).with(term.to_lowercase())
    }
}

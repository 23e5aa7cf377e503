//! Cache-backed facade over the forecast, alerts and geocoding providers.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use weatherdash_core::{CacheConfig, Config};
use weatherdash_storage::{ActiveLocation, Coordinates, SavedCities};

use crate::alerts::AlertsProvider;
use crate::error::{Result, WeatherError};
use crate::geocode::Geocoder;
use crate::location::GeoState;
use crate::preview::{self, Preview};
use crate::provider::ForecastProvider;
use crate::query::{keys, QueryClient};
use crate::resolve::{resolve, FallbackLocation, ResolvedLocation};
use crate::search::normalize_term;
use crate::types::{CandidatePlace, WeatherAlert, WeatherSnapshot};

/// The dashboard's location and forecast
#[derive(Debug, Clone)]
pub struct ActiveWeather {
    pub location: ResolvedLocation,
    pub snapshot: Arc<WeatherSnapshot>,
}

#[derive(Clone)]
pub struct WeatherService {
    forecast: ForecastProvider,
    alerts: AlertsProvider,
    geocoder: Geocoder,
    saved: SavedCities,
    queries: QueryClient,
    staleness: CacheConfig,
    fallback: FallbackLocation,
    precision: u32,
}

impl WeatherService {
    pub fn new(config: &Config, saved: SavedCities) -> Result<Self> {
        Ok(Self {
            forecast: ForecastProvider::new(&config.weather)?,
            alerts: AlertsProvider::new(&config.weather)?,
            geocoder: Geocoder::new(&config.weather)?,
            saved,
            queries: QueryClient::new(),
            staleness: config.cache.clone(),
            fallback: FallbackLocation::from(&config.location),
            precision: config.weather.coordinate_precision,
        })
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn fallback(&self) -> &FallbackLocation {
        &self.fallback
    }

    /// Forecast for a point through the cache, with `stale` as its window.
    pub async fn weather_for(
        &self,
        coords: Coordinates,
        label: Option<&str>,
        stale: Duration,
    ) -> Result<Arc<WeatherSnapshot>> {
        let coords = coords.rounded(self.precision);
        let key = keys::weather_coords(coords, label.unwrap_or_default());
        let provider = self.forecast.clone();
        let label = label.map(str::to_string);

        self.queries
            .weather
            .get(key, stale, move || async move {
                provider.fetch_by_coords(coords, label.as_deref()).await.map(Arc::new)
            })
            .await
    }

    /// Foreground forecast for a point
    pub async fn fetch_by_coords(
        &self,
        coords: Coordinates,
        label: Option<&str>,
    ) -> Result<Arc<WeatherSnapshot>> {
        self.weather_for(coords, label, self.staleness.dashboard_stale()).await
    }

    /// Forecast for a saved city.
    ///
    /// Shares the cache entry of a coordinate fetch with the city's label.
    /// Fails with `CityNotFound` if the id is not saved.
    pub async fn fetch_by_city(&self, city_id: &str) -> Result<Arc<WeatherSnapshot>> {
        let city = self
            .saved
            .get_by_id(city_id)
            .ok_or_else(|| WeatherError::CityNotFound(city_id.to_string()))?;

        self.fetch_by_coords(city.coords(), Some(&city.label())).await
    }

    /// Active alerts for a point; empty rather than failing.
    pub async fn alerts_for(&self, coords: Coordinates) -> Arc<Vec<WeatherAlert>> {
        let coords = coords.rounded(self.precision);
        let provider = self.alerts.clone();

        self.queries
            .alerts
            .get(keys::alerts_at(coords), self.staleness.alerts_stale(), move || async move {
                Ok(Arc::new(provider.fetch_by_coords(coords).await))
            })
            .await
            .unwrap_or_default()
    }

    /// Reverse-geocoded place for a point, cached for the reverse window.
    ///
    /// Only answers from the provider are cached; a failed lookup yields
    /// `None` now and is asked again next time.
    pub async fn place_for(&self, coords: Coordinates) -> Option<CandidatePlace> {
        let coords = coords.rounded(self.precision);
        let geocoder = self.geocoder.clone();

        let result = self
            .queries
            .places
            .get(keys::reverse(coords), self.staleness.reverse_geocode_stale(), move || async move {
                geocoder.reverse_geocode(coords).await
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::debug!("Reverse geocode failed: {}", e);
            None
        })
    }

    /// Places matching `term`; terms too short to search yield nothing.
    pub async fn search(&self, term: &str) -> Result<Arc<Vec<CandidatePlace>>> {
        let Some(term) = normalize_term(term) else {
            return Ok(Arc::default());
        };
        let geocoder = self.geocoder.clone();
        let key = keys::search(&term);

        self.queries
            .search
            .get(key, self.staleness.search_stale(), move || async move {
                geocoder.search(&term).await.map(Arc::new)
            })
            .await
    }

    /// Resolve the active location and load its forecast.
    ///
    /// A device fix is labelled by reverse geocoding when possible. Without a
    /// fix the fallback coordinates are fetched under a placeholder label.
    pub async fn load_active_weather(
        &self,
        active: &ActiveLocation,
        geo: &GeoState,
    ) -> Result<ActiveWeather> {
        let saved = self.saved.list();
        let mut location = resolve(active, &saved, geo, &self.fallback);

        if location.needs_reverse_geocode {
            if let Some(place) = self.place_for(location.coords).await {
                location.label = place.label();
            }
        }

        let snapshot = self
            .fetch_by_coords(location.coords, Some(&location.label))
            .await?;
        Ok(ActiveWeather { location, snapshot })
    }

    /// Warm the cache for every saved city so previews fill in.
    ///
    /// Returns how many cities loaded.
    pub async fn prefetch_saved(&self) -> usize {
        let stale = self.staleness.preview_stale();
        let mut tasks = JoinSet::new();

        for city in self.saved.list() {
            let service = self.clone();
            tasks.spawn(async move {
                let label = city.label();
                service.weather_for(city.coords(), Some(&label), stale).await
            });
        }

        let mut loaded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => loaded += 1,
                Ok(Err(e)) => tracing::debug!("Preview prefetch failed: {}", e),
                Err(e) => tracing::warn!("Preview prefetch task failed: {}", e),
            }
        }

        tracing::info!("Prefetched {} saved city forecasts", loaded);
        loaded
    }

    /// Mark all forecasts and alerts stale
    pub fn invalidate_weather(&self) {
        self.queries.weather.invalidate(&keys::weather());
        self.queries.alerts.invalidate(&keys::alerts());
    }

    pub fn active_alert_count(&self) -> usize {
        preview::active_alert_count(&self.queries, Utc::now().timestamp_millis())
    }

    pub fn previews(&self) -> HashMap<String, Preview> {
        preview::previews(&self.queries, Utc::now().timestamp_millis())
    }

    pub fn preview_for_label(&self, label: &str) -> Preview {
        preview::preview_for_label(&self.queries, label, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use weatherdash_storage::{MemoryStore, Storage};

    fn service() -> WeatherService {
        let saved = SavedCities::new(Storage::new(Arc::new(MemoryStore::new())));
        WeatherService::new(&Config::default(), saved).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_city_is_not_found() {
        let err = service().fetch_by_city("atlantis").await.unwrap_err();
        assert_eq!(err, WeatherError::CityNotFound("atlantis".into()));
    }

    #[tokio::test]
    async fn test_short_search_term_is_empty_without_request() {
        let service = service();
        assert!(service.search(" a ").await.unwrap().is_empty());
        assert!(service.queries().search.is_empty());
    }

    #[tokio::test]
    async fn test_prefetch_with_no_saved_cities() {
        assert_eq!(service().prefetch_saved().await, 0);
    }

    #[tokio::test]
    async fn test_empty_cache_projections() {
        let service = service();
        assert_eq!(service.active_alert_count(), 0);
        assert!(service.previews().is_empty());
        assert!(service.preview_for_label("Kansas City, MO, US").is_placeholder());
        assert_eq!(service.fallback().label, "Kansas City, MO, US");
    }
}

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use weatherdash_core::{AppError, Config};
use weatherdash_storage::{
    ActiveLocation, ActiveLocationStore, KeyValueStore, RecentSearches, SavedCities, SqliteStore,
    Storage,
};
use weatherdash_weather::{
    ActiveWeather, GeoOptions, GeoState, GeolocationAdapter, StaticPosition, WeatherService,
};

/// Application state: durable preferences, weather service and geolocation.
pub struct App {
    config: Arc<Config>,
    saved: SavedCities,
    recent: RecentSearches,
    active: ActiveLocationStore,
    weather: WeatherService,
    geo: GeolocationAdapter<StaticPosition>,
    external_watch: JoinHandle<()>,
}

impl App {
    /// Open the store named by `config` and wire everything to it.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.storage.database_path()?;
        let backend: Arc<dyn KeyValueStore> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open store at {}", db_path.display()))?,
        );
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let validation = config.validate();
        for warning in &validation.warnings {
            tracing::warn!("Config: {}", warning);
        }
        if !validation.is_valid() {
            anyhow::bail!("Invalid configuration: {}", validation.error_summary());
        }

        let storage = Storage::new(backend);
        let saved = SavedCities::new(storage.clone());
        let recent = RecentSearches::new(storage.clone());
        let active = ActiveLocationStore::new(storage.clone());

        let weather = WeatherService::new(&config, saved.clone())?;
        let geo = GeolocationAdapter::new(
            StaticPosition::from_config(&config.location),
            GeoOptions::from(&config.location),
        );
        let external_watch = storage.spawn_external_watch(config.storage.external_sync_period());

        tracing::info!(
            "Loaded {} saved cities, {} recent searches",
            saved.list().len(),
            recent.list().len()
        );

        Ok(Self {
            config: Arc::new(config),
            saved,
            recent,
            active,
            weather,
            geo,
            external_watch,
        })
    }

    /// Load weather for whatever location is active.
    ///
    /// A `geo` selection asks for a position first unless one is already
    /// settled; the fallback city is shown while it can't be had.
    pub async fn refresh(&self) -> Result<ActiveWeather, AppError> {
        let active = self.active.get();
        let geo = match (&active, self.geo.state()) {
            (ActiveLocation::Geo, GeoState::Idle) => self.geo.request().await,
            (_, state) => state,
        };

        Ok(self.weather.load_active_weather(&active, &geo).await?)
    }

    /// Warm previews for saved cities in the background
    pub fn spawn_prefetch(&self) -> JoinHandle<usize> {
        let weather = self.weather.clone();
        tokio::spawn(async move { weather.prefetch_saved().await })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn saved(&self) -> &SavedCities {
        &self.saved
    }

    pub fn recent(&self) -> &RecentSearches {
        &self.recent
    }

    pub fn active(&self) -> &ActiveLocationStore {
        &self.active
    }

    pub fn weather(&self) -> &WeatherService {
        &self.weather
    }

    pub fn geo(&self) -> &GeolocationAdapter<StaticPosition> {
        &self.geo
    }

    pub fn shutdown(&self) {
        tracing::info!("Shutting down");
        self.external_watch.abort();
    }
}

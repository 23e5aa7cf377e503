//! Weather data for the dashboard.
//!
//! Open-Meteo forecasts and geocoding, NWS alerts and Nominatim reverse
//! geocoding, all read through a stale-while-revalidate query cache. Also
//! resolves the active location against saved cities and device geolocation.

pub mod alerts;
pub mod alerts_view;
pub mod cache;
pub mod error;
pub mod geocode;
pub mod location;
pub mod preview;
pub mod provider;
pub mod query;
pub mod resolve;
pub mod search;
pub mod service;
pub mod types;

pub use alerts::AlertsProvider;
pub use alerts_view::{sort_alerts, time_until, AlertFilter, SeverityCounts};
pub use cache::{LoadAbandoned, QueryCache, QueryKey};
pub use error::{Result, WeatherError};
pub use geocode::Geocoder;
pub use location::{GeoOptions, GeoState, GeolocationAdapter, PositionSource, StaticPosition};
pub use preview::Preview;
pub use provider::ForecastProvider;
pub use query::{keys, QueryClient};
pub use resolve::{
    resolve, FallbackLocation, LocationSource, ResolvedLocation, CURRENT_LOCATION_LABEL,
    LOCATING_LABEL,
};
pub use search::{normalize_term, pick_place, save_place, Debouncer};
pub use service::{ActiveWeather, WeatherService};
pub use types::*;

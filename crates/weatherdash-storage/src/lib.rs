//! Durable preferences for the weather dashboard.
//!
//! A string-keyed store (SQLite or in-memory) wrapped with JSON encoding,
//! schema validation and per-key change subscriptions, plus the three
//! registries built on it: saved cities, recent searches and the active
//! location.

pub mod active_location;
pub mod error;
pub mod kv;
pub mod model;
pub mod persisted;
pub mod recent_searches;
pub mod saved_cities;

pub use active_location::{ActiveLocationStore, ACTIVE_LOCATION_KEY};
pub use error::{StorageError, StorageResult};
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
pub use model::{city_id, format_label, ActiveLocation, Coordinates, RecentSearch, SavedCity, SavedCityInput};
pub use persisted::{Persisted, Storage, Subscription, Validate};
pub use recent_searches::{RecentSearches, MAX_RECENT_SEARCHES, RECENT_SEARCHES_KEY};
pub use saved_cities::{SaveOutcome, SavedCities, SAVED_CITIES_KEY};

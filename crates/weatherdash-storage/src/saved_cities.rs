//! Bookmarked cities, newest first.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::model::{SavedCity, SavedCityInput};
use crate::persisted::{Persisted, Storage, Subscription};

pub const SAVED_CITIES_KEY: &str = "weather:savedCities:v1";

/// Result of a save request.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Added(SavedCity),
    /// A city with the same id was already saved; it is left untouched
    AlreadySaved(SavedCity),
}

impl SaveOutcome {
    pub fn city(&self) -> &SavedCity {
        match self {
            SaveOutcome::Added(city) | SaveOutcome::AlreadySaved(city) => city,
        }
    }

    pub fn was_added(&self) -> bool {
        matches!(self, SaveOutcome::Added(_))
    }
}

/// Registry of saved cities under `SAVED_CITIES_KEY`.
///
/// Every mutation rewrites the whole list, sorted by `added_at` descending.
#[derive(Clone)]
pub struct SavedCities {
    inner: Persisted<Vec<SavedCity>>,
}

impl SavedCities {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            inner: Persisted::new(storage, SAVED_CITIES_KEY),
        }
    }

    pub fn list(&self) -> Vec<SavedCity> {
        let mut cities = self.inner.get();
        sort_newest_first(&mut cities);
        cities
    }

    pub fn get_by_id(&self, id: &str) -> Option<SavedCity> {
        self.inner.get().into_iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.get().iter().any(|c| c.id == id)
    }

    /// Save a city, stamping it with the current time.
    pub fn add(&self, input: SavedCityInput) -> StorageResult<SaveOutcome> {
        self.add_at(input, Utc::now().timestamp_millis())
    }

    /// Save a city with an explicit `added_at`.
    ///
    /// Re-saving an existing id is a no-op that keeps the original entry.
    pub fn add_at(&self, input: SavedCityInput, added_at: i64) -> StorageResult<SaveOutcome> {
        let id = input.resolved_id();
        let mut outcome = None;

        self.inner.update(|mut cities| {
            if let Some(existing) = cities.iter().find(|c| c.id == id) {
                outcome = Some(SaveOutcome::AlreadySaved(existing.clone()));
                return None;
            }

            let city = input.into_city(added_at);
            outcome = Some(SaveOutcome::Added(city.clone()));
            cities.insert(0, city);
            sort_newest_first(&mut cities);
            Some(cities)
        })?;

        let outcome =
            outcome.ok_or_else(|| StorageError::invalid(SAVED_CITIES_KEY, "save did not run"))?;
        if outcome.was_added() {
            tracing::info!("Saved city {}", outcome.city().id);
        }
        Ok(outcome)
    }

    /// Remove a city; unknown ids are ignored.
    pub fn remove(&self, id: &str) -> StorageResult<()> {
        self.inner.update(|mut cities| {
            let before = cities.len();
            cities.retain(|c| c.id != id);
            if cities.len() == before {
                return None;
            }
            sort_newest_first(&mut cities);
            Some(cities)
        })?;
        Ok(())
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribe(listener)
    }
}

fn sort_newest_first(cities: &mut [SavedCity]) {
    cities.sort_by(|a, b| b.added_at.cmp(&a.added_at));
}

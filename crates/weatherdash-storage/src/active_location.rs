//! The single persisted "what is the app showing" selection.

use std::sync::Arc;

use crate::error::StorageResult;
use crate::model::{ActiveLocation, Coordinates, SavedCity};
use crate::persisted::{Persisted, Storage, Subscription};

pub const ACTIVE_LOCATION_KEY: &str = "weather:activeLocation:v1";

/// Reads default to `ActiveLocation::Fallback` when nothing valid is stored.
#[derive(Clone)]
pub struct ActiveLocationStore {
    inner: Persisted<ActiveLocation>,
}

impl ActiveLocationStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            inner: Persisted::new(storage, ACTIVE_LOCATION_KEY),
        }
    }

    pub fn get(&self) -> ActiveLocation {
        self.inner.get()
    }

    /// Persist `next` and notify subscribers.
    pub fn set(&self, next: ActiveLocation) -> StorageResult<()> {
        tracing::debug!("Active location -> {:?}", next);
        self.inner.set(&next)
    }

    pub fn set_geo(&self) -> StorageResult<()> {
        self.set(ActiveLocation::Geo)
    }

    pub fn set_city(&self, city: &SavedCity) -> StorageResult<()> {
        self.set(ActiveLocation::City {
            city_id: city.id.clone(),
        })
    }

    pub fn set_recent(&self, coords: Coordinates, label: impl Into<String>) -> StorageResult<()> {
        self.set(ActiveLocation::Recent {
            coords,
            label: label.into(),
        })
    }

    pub fn set_fallback(&self) -> StorageResult<()> {
        self.set(ActiveLocation::Fallback)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribe(listener)
    }
}

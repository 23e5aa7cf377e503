//! Most-recently-used list of ad-hoc location picks.

use chrono::Utc;
use std::sync::Arc;

use crate::error::StorageResult;
use crate::model::{RecentSearch, SavedCityInput};
use crate::persisted::{Persisted, Storage, Subscription};

pub const RECENT_SEARCHES_KEY: &str = "weather:recentSearches:v1";

pub const MAX_RECENT_SEARCHES: usize = 8;

#[derive(Clone)]
pub struct RecentSearches {
    inner: Persisted<Vec<RecentSearch>>,
}

impl RecentSearches {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            inner: Persisted::new(storage, RECENT_SEARCHES_KEY),
        }
    }

    /// Most recent first
    pub fn list(&self) -> Vec<RecentSearch> {
        self.inner.get()
    }

    pub fn add(&self, input: SavedCityInput) -> StorageResult<RecentSearch> {
        self.add_at(input, Utc::now().timestamp_millis())
    }

    /// Move `input` to the front, dropping any older entry with the same id
    /// and evicting past `MAX_RECENT_SEARCHES`.
    pub fn add_at(&self, input: SavedCityInput, added_at: i64) -> StorageResult<RecentSearch> {
        let entry = input.into_city(added_at);
        let front = entry.clone();

        self.inner.update(move |mut recent| {
            recent.retain(|r| r.id != entry.id);
            recent.insert(0, entry);
            recent.truncate(MAX_RECENT_SEARCHES);
            Some(recent)
        })?;

        Ok(front)
    }

    pub fn clear(&self) -> StorageResult<()> {
        self.inner.set(&Vec::new())
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribe(listener)
    }
}

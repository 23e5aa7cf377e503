//! JSON-typed access to a `KeyValueStore` with change notifications.
//!
//! Reads never fail: a missing key, malformed JSON or a value that fails
//! validation all resolve to the caller's default. Writes validate first,
//! persist the whole value, then notify every subscriber of that key
//! synchronously.

use parking_lot::{Mutex, ReentrantMutex};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::kv::KeyValueStore;

/// Schema check applied after decoding a persisted value.
pub trait Validate {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Shared persistence hub: one backend, per-key listeners.
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
    listeners: Mutex<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    /// Serializes read-modify-write cycles; re-entrant so listeners may write
    write_lock: ReentrantMutex<()>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            write_lock: ReentrantMutex::new(()),
        })
    }

    /// Decode the value under `key`, or `default` if it is missing or invalid.
    pub fn read<T>(&self, key: &str, default: T) -> T
    where
        T: DeserializeOwned + Validate,
    {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", key, e);
                return default;
            }
        };

        let value: T = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Malformed value under {}: {}", key, e);
                return default;
            }
        };

        match value.validate() {
            Ok(()) => value,
            Err(message) => {
                tracing::debug!("Invalid value under {}: {}", key, message);
                default
            }
        }
    }

    /// Validate, encode and persist `value`, then notify subscribers of `key`.
    ///
    /// A value that fails validation is rejected before anything is stored.
    pub fn write<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Validate,
    {
        if let Err(message) = value.validate() {
            tracing::warn!("Rejected write to {}: {}", key, message);
            return Err(StorageError::invalid(key, message));
        }
        let raw = serde_json::to_string(value)?;
        {
            let _guard = self.write_lock.lock();
            self.backend.set(key, &raw)?;
        }
        self.notify(key);
        Ok(())
    }

    /// Atomic read-modify-write.
    ///
    /// `f` receives the current value (or `default`) and returns the value to
    /// store, or `None` to leave storage untouched. Returns whether a write
    /// happened.
    pub fn update<T, F>(&self, key: &str, default: T, f: F) -> StorageResult<bool>
    where
        T: Serialize + DeserializeOwned + Validate,
        F: FnOnce(T) -> Option<T>,
    {
        let written = {
            let _guard = self.write_lock.lock();
            let current = self.read(key, default);
            match f(current) {
                Some(next) => {
                    next.validate().map_err(|message| StorageError::invalid(key, message))?;
                    let raw = serde_json::to_string(&next)?;
                    self.backend.set(key, &raw)?;
                    true
                }
                None => false,
            }
        };

        if written {
            self.notify(key);
        }
        Ok(written)
    }

    /// Register `listener` for changes to `key`.
    ///
    /// The listener stays registered until the returned `Subscription` is
    /// dropped or `unsubscribe`d.
    pub fn subscribe<F>(self: &Arc<Self>, key: &str, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            storage: Arc::downgrade(self),
            key: key.to_string(),
            id,
        }
    }

    /// Invoke every listener registered for `key`.
    pub fn notify(&self, key: &str) {
        // Snapshot first so listeners can subscribe, unsubscribe or write.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .get(key)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener();
        }
    }

    /// Notify subscribers of keys another process changed.
    ///
    /// Returns the number of changed keys.
    pub fn sync_external(&self) -> StorageResult<usize> {
        let changed = self.backend.external_changes()?;
        for key in &changed {
            tracing::debug!("External change to {}", key);
            self.notify(key);
        }
        Ok(changed.len())
    }

    /// Poll for outside writes every `period` until the storage is dropped.
    pub fn spawn_external_watch(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(storage) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = storage.sync_external() {
                    tracing::warn!("External change check failed: {}", e);
                }
            }
        })
    }

    fn unsubscribe(&self, key: &str, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(key) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                listeners.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, key: &str) -> usize {
        self.listeners.lock().get(key).map_or(0, Vec::len)
    }
}

/// Handle for a registered listener; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    storage: Weak<Storage>,
    key: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.upgrade() {
            storage.unsubscribe(&self.key, self.id);
        }
    }
}

/// A single reserved key holding one `T`.
pub struct Persisted<T> {
    storage: Arc<Storage>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Persisted<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Validate + Default,
{
    pub fn new(storage: Arc<Storage>, key: &'static str) -> Self {
        Self {
            storage,
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn get(&self) -> T {
        self.storage.read(self.key, T::default())
    }

    pub fn set(&self, value: &T) -> StorageResult<()> {
        self.storage.write(self.key, value)
    }

    pub fn update<F>(&self, f: F) -> StorageResult<bool>
    where
        F: FnOnce(T) -> Option<T>,
    {
        self.storage.update(self.key, T::default(), f)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.storage.subscribe(self.key, listener)
    }
}

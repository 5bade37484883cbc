//! Time-bounded context cache.
//!
//! - Readers never block each other beyond the map lock.
//! - A key being recomputed is marked in-flight; other callers asking for the
//!   same key wait for that computation instead of starting their own.
//! - If a recompute fails and an expired value exists, the expired value is
//!   served (stale-on-error).
//! - Writes are last-writer-wins. A computation that started before an
//!   invalidation returns its value but does not store it.

use crate::core::error::WorkgateError;
use rustc_hash::FxHashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

struct Slot<V> {
    entry: Option<Entry<V>>,
    in_flight: bool,
    /// Bumped by every invalidation.
    generation: u64,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            entry: None,
            in_flight: false,
            generation: 0,
        }
    }

    fn invalidate(&mut self) {
        self.entry = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// How a value was obtained; useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Fresh,
    Computed,
    Stale,
}

pub struct ContextCache<V> {
    slots: Mutex<FxHashMap<String, Slot<V>>>,
    settled: Condvar,
    max_entries: usize,
}

impl<V: Clone> ContextCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
            settled: Condvar::new(),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, Slot<V>>> {
        // A panicking compute fn cannot leave the map half-written: slots are
        // only replaced whole, so a poisoned lock is still consistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_or_compute<F>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, WorkgateError>
    where
        F: FnOnce() -> Result<V, WorkgateError>,
    {
        self.get_or_compute_traced(key, ttl, compute)
            .map(|(value, _)| value)
    }

    pub fn get_or_compute_traced<F>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(V, CacheSource), WorkgateError>
    where
        F: FnOnce() -> Result<V, WorkgateError>,
    {
        self.compute_traced(key, || compute().map(|value| (value, ttl)))
    }

    /// Like [`get_or_compute`](Self::get_or_compute), with the TTL chosen by
    /// the computation. A zero TTL keeps the value only as a stale fallback.
    pub fn get_or_compute_with<F>(&self, key: &str, compute: F) -> Result<V, WorkgateError>
    where
        F: FnOnce() -> Result<(V, Duration), WorkgateError>,
    {
        self.compute_traced(key, compute).map(|(value, _)| value)
    }

    fn compute_traced<F>(&self, key: &str, compute: F) -> Result<(V, CacheSource), WorkgateError>
    where
        F: FnOnce() -> Result<(V, Duration), WorkgateError>,
    {
        let mut slots = self.lock();
        loop {
            let now = Instant::now();
            let lookup = match slots.get(key) {
                Some(slot) if slot.in_flight => None,
                Some(Slot {
                    entry: Some(entry), ..
                }) if entry.is_fresh(now) => Some(Some(entry.value.clone())),
                _ => Some(None),
            };
            match lookup {
                None => {
                    slots = self
                        .settled
                        .wait(slots)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                Some(Some(value)) => return Ok((value, CacheSource::Fresh)),
                Some(None) => break,
            }
        }

        if !slots.contains_key(key) {
            self.evict(&mut slots);
        }
        let slot = slots.entry(key.to_string()).or_insert_with(Slot::empty);
        slot.in_flight = true;
        let started = slot.generation;
        drop(slots);

        let guard = InFlightGuard { cache: self, key };
        let result = compute();
        // Normal completion clears the mark below, under the same lock as the store.
        std::mem::forget(guard);
        let mut slots = self.lock();

        let slot = slots.entry(key.to_string()).or_insert_with(Slot::empty);
        slot.in_flight = false;
        let outcome = match result {
            Ok((value, _)) if slot.generation != started => {
                tracing::debug!(key, "invalidated while computing, not stored");
                Ok((value, CacheSource::Computed))
            }
            Ok((value, ttl)) => {
                slot.entry = Some(Entry {
                    value: value.clone(),
                    stored_at: Instant::now(),
                    ttl,
                });
                Ok((value, CacheSource::Computed))
            }
            Err(err) => match &slot.entry {
                Some(stale) => {
                    tracing::warn!(key, error = %err, "recompute failed, serving stale value");
                    Ok((stale.value.clone(), CacheSource::Stale))
                }
                None => Err(WorkgateError::CacheComputeFailure(err.to_string())),
            },
        };
        drop(slots);
        self.settled.notify_all();
        outcome
    }

    /// Fresh value for `key`, if any, without computing.
    pub fn peek(&self, key: &str) -> Option<V> {
        let slots = self.lock();
        slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        let mut slots = self.lock();
        if !slots.contains_key(key) {
            self.evict(&mut slots);
        }
        let slot = slots.entry(key.to_string()).or_insert_with(Slot::empty);
        slot.entry = Some(Entry {
            value,
            stored_at: Instant::now(),
            ttl,
        });
    }

    /// Drop the value for `key`. A computation already in flight for it still
    /// returns to its caller but does not store.
    pub fn invalidate(&self, key: &str) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(key) {
            slot.invalidate();
        }
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut slots = self.lock();
        for (key, slot) in slots.iter_mut() {
            if key.starts_with(prefix) {
                slot.invalidate();
            }
        }
    }

    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.retain(|_, slot| slot.in_flight);
        for slot in slots.values_mut() {
            slot.invalidate();
        }
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make room for one more key: drop expired idle slots, then the oldest idle one.
    fn evict(&self, slots: &mut FxHashMap<String, Slot<V>>) {
        if slots.len() < self.max_entries {
            return;
        }
        let now = Instant::now();
        slots.retain(|_, slot| {
            slot.in_flight || slot.entry.as_ref().is_some_and(|e| e.is_fresh(now))
        });
        if slots.len() < self.max_entries {
            return;
        }
        let oldest = slots
            .iter()
            .filter(|(_, slot)| !slot.in_flight)
            .min_by_key(|(_, slot)| slot.entry.as_ref().map(|e| e.stored_at))
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            slots.remove(&key);
        }
    }
}

/// Clears the in-flight mark if the compute closure panics, so waiters wake up.
struct InFlightGuard<'a, V: Clone> {
    cache: &'a ContextCache<V>,
    key: &'a str,
}

impl<V: Clone> Drop for InFlightGuard<'_, V> {
    fn drop(&mut self) {
        let mut slots = self.cache.lock();
        if let Some(slot) = slots.get_mut(self.key) {
            slot.in_flight = false;
        }
        drop(slots);
        self.cache.settled.notify_all();
    }
}

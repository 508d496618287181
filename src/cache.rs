//! # Response Cache
//!
//! One process-wide slot holding the last fully-assembled observation set.
//!
//! The slot is intentionally not partitioned by query parameters: the map
//! dashboard overwhelmingly issues the default query, and the orchestrator
//! re-applies bounds and limit to the cached set on every hit. The entry is
//! replaced wholesale on each successful aggregation, never merged.
//! Concurrent writers race with last-write-wins semantics; each reader still
//! gets a self-consistent snapshot.
//!
//! The clock is injected so TTL behavior is testable without sleeping.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::models::{Observation, SourceCounts};

/// Time source for cache expiry decisions.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Only useful from tests, but lives in the tree so
/// integration tests can drive cache expiry deterministically.
pub struct ManualClock {
    now: std::sync::Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock poisoned")
    }
}

/// The cached aggregation result.
#[derive(Clone)]
pub struct CacheEntry {
    pub observations: Vec<Observation>,
    pub source_counts: SourceCounts,
    pub data_source: String,
    created_at: Instant,
}

pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: RwLock::new(None),
        }
    }

    /// Returns the entry and its age if it is still within the TTL.
    pub async fn get(&self) -> Option<(CacheEntry, Duration)> {
        let slot = self.slot.read().await;
        let entry = slot.as_ref()?;
        let age = self.clock.now().duration_since(entry.created_at);
        if age < self.ttl {
            Some((entry.clone(), age))
        } else {
            None
        }
    }

    /// Replaces the slot wholesale.
    pub async fn set(
        &self,
        observations: Vec<Observation>,
        source_counts: SourceCounts,
        data_source: String,
    ) {
        let entry = CacheEntry {
            observations,
            source_counts,
            data_source,
            created_at: self.clock.now(),
        };
        *self.slot.write().await = Some(entry);
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use teller_core::store::{SlotStore, StoreError};
use teller_domain::TimeSlot;

/// Cache tuning. TTL is deliberately short: availability is a browsing hint,
/// not an allocation input.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 1024,
        }
    }
}

/// Point-in-time availability for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAvailability {
    pub slot_id: Uuid,
    pub capacity: i32,
    pub reserved_count: i32,
}

impl SlotAvailability {
    pub fn remaining(&self) -> i32 {
        (self.capacity - self.reserved_count).max(0)
    }

    fn from_slot(slot: &TimeSlot) -> Self {
        Self {
            slot_id: slot.id,
            capacity: slot.capacity,
            reserved_count: slot.reserved_count,
        }
    }
}

struct CacheEntry {
    value: SlotAvailability,
    stored_at: Instant,
    last_read: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() > ttl
    }
}

#[derive(Default)]
struct CacheStats {
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
    eviction_count: AtomicUsize,
    expired_count: AtomicUsize,
}

/// Counter snapshot for host-side observability
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

/// Read-through cache over the authoritative slot store.
///
/// Advisory only: it serves availability browsing, never the write path. The
/// allocation engine always goes to the store, so a stale entry can never
/// cause overbooking. Entries expire after a short TTL and the map is bounded
/// by evicting the least recently read entry.
pub struct AvailabilityCache {
    store: Arc<dyn SlotStore>,
    entries: Mutex<HashMap<Uuid, CacheEntry>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl AvailabilityCache {
    pub fn new(store: Arc<dyn SlotStore>, config: CacheConfig) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Availability for one slot, served from cache while fresh
    pub async fn get_availability(&self, slot_id: Uuid) -> Result<SlotAvailability, StoreError> {
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&slot_id) {
                if entry.is_expired(self.config.ttl) {
                    entries.remove(&slot_id);
                    self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    entry.last_read = Instant::now();
                    self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value.clone());
                }
            }
        }
        self.stats.miss_count.fetch_add(1, Ordering::Relaxed);

        let slot = self
            .store
            .get_slot(slot_id)
            .await?
            .ok_or(StoreError::SlotNotFound(slot_id))?;
        let value = SlotAvailability::from_slot(&slot);

        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&slot_id) {
            if let Some(coldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_read)
                .map(|(id, _)| *id)
            {
                entries.remove(&coldest);
                self.stats.eviction_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(slot_id = %coldest, "availability entry evicted");
            }
        }
        let now = Instant::now();
        entries.insert(
            slot_id,
            CacheEntry {
                value: value.clone(),
                stored_at: now,
                last_read: now,
            },
        );
        Ok(value)
    }

    /// Drop a slot's entry so the next read reloads from the store
    pub fn invalidate(&self, slot_id: Uuid) {
        self.entries.lock().unwrap().remove(&slot_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            hit_count: self.stats.hit_count.load(Ordering::Relaxed),
            miss_count: self.stats.miss_count.load(Ordering::Relaxed),
            eviction_count: self.stats.eviction_count.load(Ordering::Relaxed),
            expired_count: self.stats.expired_count.load(Ordering::Relaxed),
        }
    }
}

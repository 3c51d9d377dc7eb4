use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use teller_core::store::{AdjustOutcome, SlotStore, StoreError};

/// Proof that a slot decrement was applied for one in-flight request.
///
/// A token must be committed or released exactly once and never outlives the
/// request. Once consumed, further commit/release calls are no-ops so that
/// compensation stays idempotent.
#[derive(Debug)]
pub struct ReservationToken {
    slot_id: Uuid,
    count: i32,
    sequence: u64,
    consumed: bool,
}

impl ReservationToken {
    pub fn slot_id(&self) -> Uuid {
        self.slot_id
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    /// Arrival-order stamp, monotonic per allocator
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// Exactly-once slot allocation against the authoritative store.
///
/// Contention is scoped per slot: an arena of lock handles keyed by slot id
/// serializes writers on one slot while unrelated slots proceed in parallel.
/// The tokio mutex wakes waiters in FIFO order, so contended requests are
/// served strictly in arrival order; sequence numbers (never wall clocks)
/// record that order.
pub struct SlotAllocator {
    store: Arc<dyn SlotStore>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    next_sequence: AtomicU64,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    fn lock_handle(&self, slot_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(slot_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reserve `count` units of a slot.
    ///
    /// The per-slot lock is held only for the counter update, never across
    /// provider calls, so a slow downstream dependency cannot block other
    /// requests for the same slot.
    pub async fn reserve(
        &self,
        slot_id: Uuid,
        count: i32,
    ) -> Result<ReservationToken, AllocationError> {
        if count <= 0 {
            return Err(AllocationError::Conflict(slot_id));
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let handle = self.lock_handle(slot_id);
        let _slot = handle.lock().await;

        match self.store.try_adjust_reserved(slot_id, count).await {
            Ok(AdjustOutcome::Applied(reserved)) => {
                tracing::debug!(%slot_id, sequence, reserved, "reservation applied");
                Ok(ReservationToken {
                    slot_id,
                    count,
                    sequence,
                    consumed: false,
                })
            }
            Ok(AdjustOutcome::Rejected) => Err(AllocationError::SlotFull(slot_id)),
            Err(StoreError::SlotNotFound(id)) => Err(AllocationError::SlotNotFound(id)),
            Err(err) => Err(AllocationError::Store(err)),
        }
    }

    /// Undo the reservation held by `token`.
    ///
    /// Idempotent: releasing a consumed token is a no-op. The token is only
    /// marked consumed once the store answered, so a backend outage leaves it
    /// live for the caller to retry.
    pub async fn release(&self, token: &mut ReservationToken) -> Result<(), AllocationError> {
        if token.consumed {
            tracing::debug!(slot_id = %token.slot_id, "release skipped, token already consumed");
            return Ok(());
        }
        let handle = self.lock_handle(token.slot_id);
        let _slot = handle.lock().await;

        match self.store.try_adjust_reserved(token.slot_id, -token.count).await {
            Ok(AdjustOutcome::Applied(reserved)) => {
                token.consumed = true;
                tracing::debug!(slot_id = %token.slot_id, reserved, "reservation released");
                Ok(())
            }
            Ok(AdjustOutcome::Rejected) => {
                // the counter is already at its floor; nothing left to return
                token.consumed = true;
                tracing::warn!(slot_id = %token.slot_id, "release rejected by store, counter at floor");
                Ok(())
            }
            Err(StoreError::SlotNotFound(id)) => Err(AllocationError::SlotNotFound(id)),
            Err(err) => Err(AllocationError::Store(err)),
        }
    }

    /// Make the reservation permanent. No counter change; the token is
    /// invalidated against any further release.
    pub fn commit(&self, token: &mut ReservationToken) {
        if token.consumed {
            tracing::debug!(slot_id = %token.slot_id, "commit skipped, token already consumed");
            return;
        }
        token.consumed = true;
        tracing::debug!(slot_id = %token.slot_id, sequence = token.sequence, "reservation committed");
    }

    /// Return capacity that was committed to a booking which is now being
    /// cancelled. An underflow rejection is logged and swallowed so repeated
    /// compensation stays harmless.
    pub async fn release_committed(
        &self,
        slot_id: Uuid,
        count: i32,
    ) -> Result<(), AllocationError> {
        if count <= 0 {
            return Err(AllocationError::Conflict(slot_id));
        }
        let handle = self.lock_handle(slot_id);
        let _slot = handle.lock().await;

        match self.store.try_adjust_reserved(slot_id, -count).await {
            Ok(AdjustOutcome::Applied(reserved)) => {
                tracing::debug!(%slot_id, reserved, "committed capacity returned");
                Ok(())
            }
            Ok(AdjustOutcome::Rejected) => {
                tracing::error!(%slot_id, "committed release rejected, counter already at floor");
                Ok(())
            }
            Err(StoreError::SlotNotFound(id)) => Err(AllocationError::SlotNotFound(id)),
            Err(err) => Err(AllocationError::Store(err)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Slot is fully booked: {0}")]
    SlotFull(Uuid),

    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Conflicting reservation request for slot {0}")]
    Conflict(Uuid),

    #[error("Slot store error: {0}")]
    Store(StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use teller_domain::TimeSlot;
    use teller_store::MemorySlotStore;

    async fn seeded_store(capacity: i32) -> (Arc<MemorySlotStore>, Uuid) {
        let store = Arc::new(MemorySlotStore::new());
        let slot = TimeSlot::new(
            "BR-001".to_string(),
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            capacity,
        );
        let slot_id = slot.id;
        store.create_slot(&slot).await.unwrap();
        (store, slot_id)
    }

    async fn reserved_count(store: &Arc<MemorySlotStore>, slot_id: Uuid) -> i32 {
        store
            .get_slot(slot_id)
            .await
            .unwrap()
            .unwrap()
            .reserved_count
    }

    #[tokio::test]
    async fn test_reserve_and_release_round_trip() {
        let (store, slot_id) = seeded_store(3).await;
        let allocator = SlotAllocator::new(store.clone());

        let mut token = allocator.reserve(slot_id, 1).await.unwrap();
        assert_eq!(reserved_count(&store, slot_id).await, 1);
        assert!(!token.is_consumed());

        allocator.release(&mut token).await.unwrap();
        assert!(token.is_consumed());
        assert_eq!(reserved_count(&store, slot_id).await, 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (store, slot_id) = seeded_store(3).await;
        let allocator = SlotAllocator::new(store.clone());

        let mut token = allocator.reserve(slot_id, 1).await.unwrap();
        allocator.release(&mut token).await.unwrap();
        allocator.release(&mut token).await.unwrap();

        // released once, not twice
        assert_eq!(reserved_count(&store, slot_id).await, 0);
    }

    #[tokio::test]
    async fn test_commit_invalidates_token() {
        let (store, slot_id) = seeded_store(3).await;
        let allocator = SlotAllocator::new(store.clone());

        let mut token = allocator.reserve(slot_id, 1).await.unwrap();
        allocator.commit(&mut token);
        assert!(token.is_consumed());

        // a committed reservation can no longer be released through the token
        allocator.release(&mut token).await.unwrap();
        assert_eq!(reserved_count(&store, slot_id).await, 1);
    }

    #[tokio::test]
    async fn test_double_commit_is_noop() {
        let (store, slot_id) = seeded_store(2).await;
        let allocator = SlotAllocator::new(store.clone());

        let mut token = allocator.reserve(slot_id, 1).await.unwrap();
        allocator.commit(&mut token);
        allocator.commit(&mut token);
        assert_eq!(reserved_count(&store, slot_id).await, 1);
    }

    #[tokio::test]
    async fn test_reserve_unknown_slot() {
        let store = Arc::new(MemorySlotStore::new());
        let allocator = SlotAllocator::new(store);

        let result = allocator.reserve(Uuid::new_v4(), 1).await;
        assert!(matches!(result, Err(AllocationError::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn test_non_positive_count_rejected() {
        let (store, slot_id) = seeded_store(3).await;
        let allocator = SlotAllocator::new(store);

        assert!(matches!(
            allocator.reserve(slot_id, 0).await,
            Err(AllocationError::Conflict(_))
        ));
        assert!(matches!(
            allocator.reserve(slot_id, -2).await,
            Err(AllocationError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let (store, slot_id) = seeded_store(5).await;
        let allocator = SlotAllocator::new(store);

        let first = allocator.reserve(slot_id, 1).await.unwrap();
        let second = allocator.reserve(slot_id, 1).await.unwrap();
        let third = allocator.reserve(slot_id, 1).await.unwrap();
        assert!(first.sequence() < second.sequence());
        assert!(second.sequence() < third.sequence());
    }

    #[tokio::test]
    async fn test_release_committed_returns_capacity() {
        let (store, slot_id) = seeded_store(2).await;
        let allocator = SlotAllocator::new(store.clone());

        let mut token = allocator.reserve(slot_id, 1).await.unwrap();
        allocator.commit(&mut token);
        assert_eq!(reserved_count(&store, slot_id).await, 1);

        allocator.release_committed(slot_id, 1).await.unwrap();
        assert_eq!(reserved_count(&store, slot_id).await, 0);

        // underflow is swallowed, the counter stays at its floor
        allocator.release_committed(slot_id, 1).await.unwrap();
        assert_eq!(reserved_count(&store, slot_id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_never_overbook() {
        let (store, slot_id) = seeded_store(3).await;
        let allocator = Arc::new(SlotAllocator::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(
                async move { allocator.reserve(slot_id, 1).await },
            ));
        }

        let mut won = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(AllocationError::SlotFull(_)) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(won, 3);
        assert_eq!(full, 7);
        assert_eq!(reserved_count(&store, slot_id).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_goes_to_exactly_one_caller() {
        let (store, slot_id) = seeded_store(4).await;
        let allocator = Arc::new(SlotAllocator::new(store.clone()));

        // burn down to one remaining unit
        for _ in 0..3 {
            allocator.reserve(slot_id, 1).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..6 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(
                async move { allocator.reserve(slot_id, 1).await },
            ));
        }

        let outcomes: Vec<_> = {
            let mut v = Vec::new();
            for handle in handles {
                v.push(handle.await.unwrap());
            }
            v
        };
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AllocationError::SlotFull(_))))
                .count(),
            5
        );
        assert_eq!(reserved_count(&store, slot_id).await, 4);
    }
}

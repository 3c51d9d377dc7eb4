use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use teller_core::store::{AdjustOutcome, BookingStore, SlotStore, StoreError};
use teller_domain::{Booking, TimeSlot};

/// In-memory authoritative slot store.
///
/// One mutex guards the whole map, which trivially satisfies the
/// single-writer-per-slot contract of `try_adjust_reserved`. Used by tests
/// and single-process deployments.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<Uuid, TimeSlot>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn create_slot(&self, slot: &TimeSlot) -> Result<(), StoreError> {
        self.slots.lock().unwrap().insert(slot.id, slot.clone());
        Ok(())
    }

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<TimeSlot>, StoreError> {
        Ok(self.slots.lock().unwrap().get(&slot_id).cloned())
    }

    async fn try_adjust_reserved(
        &self,
        slot_id: Uuid,
        delta: i32,
    ) -> Result<AdjustOutcome, StoreError> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .get_mut(&slot_id)
            .ok_or(StoreError::SlotNotFound(slot_id))?;

        let next = slot.reserved_count + delta;
        if next < 0 || next > slot.capacity {
            return Ok(AdjustOutcome::Rejected);
        }
        slot.reserved_count = next;
        slot.updated_at = Utc::now();
        Ok(AdjustOutcome::Applied(next))
    }
}

/// In-memory booking store
#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored booking, for inspection in tests
    pub fn all(&self) -> Vec<Booking> {
        self.bookings.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.bookings
            .lock()
            .unwrap()
            .insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        if !bookings.contains_key(&booking.id) {
            return Err(StoreError::BookingNotFound(booking.id));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().unwrap().get(&booking_id).cloned())
    }
}

use async_trait::async_trait;
use uuid::Uuid;

use teller_domain::{Booking, TimeSlot};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Outcome of a conditional adjustment of a slot's reserved count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// The counter moved; carries the new reserved count
    Applied(i32),
    /// Applying the delta would have left `reserved_count` outside
    /// `[0, capacity]`; nothing changed
    Rejected,
}

/// Authoritative storage for slot capacity counters.
///
/// `try_adjust_reserved` is the atomic conditional-update primitive the
/// allocation engine builds on: implementations must apply the delta and the
/// bounds check as one indivisible step per slot key.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn create_slot(&self, slot: &TimeSlot) -> Result<(), StoreError>;

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<TimeSlot>, StoreError>;

    /// Atomically add `delta` to the slot's reserved count, only if the
    /// result stays within `[0, capacity]`
    async fn try_adjust_reserved(&self, slot_id: Uuid, delta: i32)
        -> Result<AdjustOutcome, StoreError>;
}

/// Persistence for booking records
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Persist the booking's current state; fails with `BookingNotFound`
    /// when the record was never created
    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError>;
}

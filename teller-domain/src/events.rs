use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Lifecycle stage announced to downstream consumers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEventKind {
    Created,
    Confirmed,
    Failed,
    Cancelled,
}

/// Booking lifecycle event published to the message bus.
///
/// Delivery is at-least-once: consumers must tolerate duplicates. Events for
/// one booking id are published in state-transition order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    pub booking_id: Uuid,
    pub slot_id: Uuid,
    pub status: BookingEventKind,
    pub timestamp: DateTime<Utc>,
}

impl BookingEvent {
    pub fn new(booking_id: Uuid, slot_id: Uuid, status: BookingEventKind) -> Self {
        Self {
            booking_id,
            slot_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

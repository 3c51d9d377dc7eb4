use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// A bookable (branch, date, start time) unit with finite capacity.
///
/// `reserved_count` is maintained by the allocation engine's storage layer
/// under a single-writer-per-slot discipline; `0 <= reserved_count <= capacity`
/// holds at all times, including under concurrent writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub branch_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub capacity: i32,
    pub reserved_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(branch_id: String, date: NaiveDate, start_time: NaiveTime, capacity: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            branch_id,
            date,
            start_time,
            capacity,
            reserved_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Units still open for reservation
    pub fn remaining(&self) -> i32 {
        (self.capacity - self.reserved_count).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.reserved_count >= self.capacity
    }
}

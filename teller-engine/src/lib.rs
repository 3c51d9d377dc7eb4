pub mod allocation;
pub mod cache;

pub use allocation::{AllocationError, ReservationToken, SlotAllocator};
pub use cache::{AvailabilityCache, CacheConfig, CacheStatsReport, SlotAvailability};

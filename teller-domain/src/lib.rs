pub mod slot;
pub mod booking;
pub mod events;
pub mod pii;

pub use slot::TimeSlot;
pub use booking::{Booking, BookingRequest, BookingStateError, BookingStatus, CredentialId};
pub use events::{BookingEvent, BookingEventKind};
pub use pii::Masked;

pub mod store;
pub mod identity;
pub mod transport;
pub mod retry;

pub use store::{AdjustOutcome, BookingStore, SlotStore, StoreError};
pub use identity::{IdentityError, IdentityProvider};
pub use transport::{EventTransport, PublishError};
pub use retry::RetryPolicy;

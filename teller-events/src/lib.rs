pub mod kafka;
pub mod memory;
pub mod publisher;

pub use kafka::KafkaEventTransport;
pub use memory::{MemoryEventTransport, SentRecord};
pub use publisher::{BookingEventPublisher, PublisherConfig};

pub mod orchestrator;

pub use orchestrator::{BookingError, BookingOrchestrator};

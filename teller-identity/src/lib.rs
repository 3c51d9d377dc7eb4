pub mod breaker;
pub mod gateway;
pub mod mock;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use gateway::{GatewayConfig, IdentityGateway};
pub use mock::{MockIdentityProvider, MockOutcome};

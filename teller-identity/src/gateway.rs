use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use teller_core::identity::{IdentityError, IdentityProvider};
use teller_core::retry::RetryPolicy;
use teller_domain::CredentialId;

use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};

/// Gateway tuning. `call_timeout` bounds a single provider attempt; the
/// retry policy bounds how many attempts one provisioning request makes.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub call_timeout: Duration,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Resilient client for the external identity provider.
///
/// Every attempt for a booking carries the same idempotency key, derived from
/// the booking id, so a retry after an ambiguous failure can never mint a
/// second credential. Only transient errors are retried; a name conflict is
/// a definitive provider answer and is surfaced on the first attempt.
pub struct IdentityGateway {
    provider: Arc<dyn IdentityProvider>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl IdentityGateway {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: GatewayConfig) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::new("identity-provider", config.breaker),
            retry: config.retry,
            call_timeout: config.call_timeout,
        }
    }

    /// Deterministic key for one booking, stable across retries and restarts.
    pub fn idempotency_key(booking_id: Uuid) -> String {
        format!("booking-{}", booking_id.simple())
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub async fn provision_credential(
        &self,
        booking_id: Uuid,
        desired_name: &str,
    ) -> Result<CredentialId, IdentityError> {
        let idempotency_key = Self::idempotency_key(booking_id);
        let mut attempt: u32 = 1;

        loop {
            if !self.breaker.try_acquire() {
                return Err(IdentityError::ProviderUnavailable(format!(
                    "Circuit Breaker [{}] is open",
                    self.breaker.name()
                )));
            }

            let outcome = match timeout(
                self.call_timeout,
                self.provider.create_credential(&idempotency_key, desired_name),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(IdentityError::Timeout(self.call_timeout)),
            };

            match outcome {
                Ok(credential) => {
                    self.breaker.record_success();
                    tracing::debug!(%booking_id, attempt, "Identity credential provisioned");
                    return Ok(credential);
                }
                Err(err) if err.is_transient() => {
                    self.breaker.record_failure();
                    if self.breaker.state() == CircuitState::Open {
                        tracing::warn!(
                            %booking_id,
                            "Identity call failed and tripped the breaker, not retrying: {}",
                            err
                        );
                        return Err(err);
                    }
                    if self.retry.is_exhausted(attempt) {
                        tracing::warn!(
                            %booking_id,
                            attempt,
                            "Identity retry budget exhausted: {}",
                            err
                        );
                        return Err(err);
                    }
                    let backoff = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        %booking_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient identity failure, backing off: {}",
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    // The provider answered; a business rejection is not a fault.
                    self.breaker.record_success();
                    return Err(err);
                }
            }
        }
    }
}

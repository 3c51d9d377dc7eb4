use std::time::Duration;

use async_trait::async_trait;

use teller_domain::CredentialId;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Circuit open, connection failure, or a 5xx-class provider response
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the desired name as already taken
    #[error("Credential name conflict: {0}")]
    NameConflict(String),

    #[error("Identity provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl IdentityError {
    /// Transient failures are worth retrying; business rejections are not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IdentityError::ProviderUnavailable(_) | IdentityError::Timeout(_)
        )
    }
}

/// Raw client for the external identity provider.
///
/// One invocation is one provider round trip; resilience (breaker, retries,
/// timeouts) is layered on by the gateway. `idempotency_key` is stable across
/// retries of the same booking so the provider never creates a duplicate
/// credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_credential(
        &self,
        idempotency_key: &str,
        desired_name: &str,
    ) -> Result<CredentialId, IdentityError>;
}

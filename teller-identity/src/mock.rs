use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use teller_core::identity::{IdentityError, IdentityProvider};
use teller_domain::CredentialId;

/// What the next scripted call should do.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Unavailable,
    Conflict,
    /// Stall long enough to trip any realistic per-call timeout.
    Hang,
}

/// Scripted in-memory identity provider for tests and local runs.
///
/// Outcomes are consumed front to back; once the script runs dry every call
/// succeeds. Calls and the idempotency keys they carried are recorded so
/// tests can assert on retry behaviour.
#[derive(Default)]
pub struct MockIdentityProvider {
    script: Mutex<VecDeque<MockOutcome>>,
    calls: AtomicUsize,
    seen_keys: Mutex<Vec<String>>,
}

impl MockIdentityProvider {
    pub fn always_succeed() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<MockOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_keys(&self) -> Vec<String> {
        self.seen_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_credential(
        &self,
        idempotency_key: &str,
        desired_name: &str,
    ) -> Result<CredentialId, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_keys
            .lock()
            .unwrap()
            .push(idempotency_key.to_string());

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            None | Some(MockOutcome::Succeed) => {
                Ok(CredentialId(format!("cred-{desired_name}")))
            }
            Some(MockOutcome::Unavailable) => Err(IdentityError::ProviderUnavailable(
                "Simulated provider outage".to_string(),
            )),
            Some(MockOutcome::Conflict) => {
                Err(IdentityError::NameConflict(desired_name.to_string()))
            }
            Some(MockOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(CredentialId(format!("cred-{desired_name}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let provider = MockIdentityProvider::with_script(vec![
            MockOutcome::Unavailable,
            MockOutcome::Succeed,
        ]);

        assert!(provider.create_credential("key-1", "desk").await.is_err());
        assert!(provider.create_credential("key-1", "desk").await.is_ok());
        // Script exhausted, calls keep succeeding.
        assert!(provider.create_credential("key-1", "desk").await.is_ok());
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.seen_keys(), vec!["key-1", "key-1", "key-1"]);
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use teller_core::transport::{EventTransport, PublishError};

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// In-memory transport for tests and local runs. Can be told to fail the
/// next N sends to exercise retry and dead-letter paths.
#[derive(Default)]
pub struct MemoryEventTransport {
    sent: Mutex<Vec<SentRecord>>,
    fail_remaining: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryEventTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flaky(fail_remaining: u32) -> Self {
        Self {
            fail_remaining: AtomicU32::new(fail_remaining),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventTransport for MemoryEventTransport {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let left = self.fail_remaining.load(Ordering::SeqCst);
        if left > 0 {
            // u32::MAX means fail forever
            if left != u32::MAX {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(PublishError::Unavailable(
                "Simulated bus outage".to_string(),
            ));
        }

        self.sent.lock().unwrap().push(SentRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_transport_recovers_after_budget() {
        let transport = MemoryEventTransport::flaky(2);

        assert!(transport.send("t", "k", "p").await.is_err());
        assert!(transport.send("t", "k", "p").await.is_err());
        assert!(transport.send("t", "k", "p").await.is_ok());
        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.sent().len(), 1);
    }
}

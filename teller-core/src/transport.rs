use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Message bus unavailable: {0}")]
    Unavailable(String),
}

/// Low-level message bus producer.
///
/// `send` delivers one payload to `topic`; messages sharing a `key` must be
/// observed by partition-ordered consumers in send order.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}

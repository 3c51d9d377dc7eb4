use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use teller_core::transport::{EventTransport, PublishError};

/// Kafka-backed transport. Records are keyed so that one booking's events
/// land on one partition and keep their order.
#[derive(Clone)]
pub struct KafkaEventTransport {
    producer: FutureProducer,
}

impl KafkaEventTransport {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventTransport for KafkaEventTransport {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                tracing::info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic,
                    key,
                    delivery.partition,
                    delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                tracing::error!("Failed to send message to {}: {}", topic, e);
                Err(PublishError::Unavailable(e.to_string()))
            }
        }
    }
}

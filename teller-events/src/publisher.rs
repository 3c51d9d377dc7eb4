use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use teller_core::retry::RetryPolicy;
use teller_core::transport::{EventTransport, PublishError};
use teller_domain::BookingEvent;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub topic: String,
    pub retry: RetryPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "booking-lifecycle".to_string(),
            retry: RetryPolicy {
                max_attempts: 5,
                initial_backoff: std::time::Duration::from_millis(500),
                multiplier: 2.0,
                jitter: 0.2,
            },
        }
    }
}

enum RelayMessage {
    Event(BookingEvent),
    Flush(oneshot::Sender<()>),
}

/// At-least-once publisher for booking lifecycle events.
///
/// `publish` enqueues and returns immediately; a single relay task drains the
/// queue in order, so events keyed by one booking id reach the transport in
/// the order they were published. An event that exhausts its delivery budget
/// is parked in the dead-letter buffer and the relay moves on.
pub struct BookingEventPublisher {
    tx: mpsc::UnboundedSender<RelayMessage>,
    dead_letters: Arc<Mutex<Vec<BookingEvent>>>,
}

impl BookingEventPublisher {
    pub fn spawn(transport: Arc<dyn EventTransport>, config: PublisherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(relay(rx, transport, config, dead_letters.clone()));
        Self { tx, dead_letters }
    }

    /// Hand an event to the relay. Never blocks the caller on the bus.
    pub fn publish(&self, event: BookingEvent) {
        if let Err(rejected) = self.tx.send(RelayMessage::Event(event)) {
            if let RelayMessage::Event(event) = rejected.0 {
                tracing::error!(
                    booking_id = %event.booking_id,
                    "Event relay is gone, parking event in dead letters"
                );
                self.dead_letters.lock().unwrap().push(event);
            }
        }
    }

    /// Wait until everything enqueued before this call has been resolved,
    /// either delivered or dead-lettered.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(RelayMessage::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub fn dead_letters(&self) -> Vec<BookingEvent> {
        self.dead_letters.lock().unwrap().clone()
    }
}

async fn relay(
    mut rx: mpsc::UnboundedReceiver<RelayMessage>,
    transport: Arc<dyn EventTransport>,
    config: PublisherConfig,
    dead_letters: Arc<Mutex<Vec<BookingEvent>>>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            RelayMessage::Event(event) => {
                if let Err(err) = deliver(transport.as_ref(), &config, &event).await {
                    tracing::error!(
                        booking_id = %event.booking_id,
                        "Event exhausted its delivery budget, parking in dead letters: {}",
                        err
                    );
                    dead_letters.lock().unwrap().push(event);
                }
            }
            RelayMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn deliver(
    transport: &dyn EventTransport,
    config: &PublisherConfig,
    event: &BookingEvent,
) -> Result<(), PublishError> {
    let payload = serde_json::to_string(event)
        .map_err(|err| PublishError::Unavailable(format!("Failed to encode event: {err}")))?;
    let key = event.booking_id.to_string();
    let mut attempt: u32 = 1;

    loop {
        match transport.send(&config.topic, &key, &payload).await {
            Ok(()) => {
                tracing::debug!(booking_id = %event.booking_id, attempt, "Booking event delivered");
                return Ok(());
            }
            Err(err) => {
                if config.retry.is_exhausted(attempt) {
                    return Err(err);
                }
                let backoff = config.retry.backoff_for(attempt);
                tracing::warn!(
                    booking_id = %event.booking_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Event delivery failed, backing off: {}",
                    err
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use teller_booking::{BookingError, BookingOrchestrator};
use teller_core::identity::IdentityProvider;
use teller_core::retry::RetryPolicy;
use teller_core::store::{BookingStore, SlotStore, StoreError};
use teller_core::transport::EventTransport;
use teller_domain::{Booking, BookingEvent, BookingRequest};
use teller_engine::allocation::SlotAllocator;
use teller_engine::cache::{AvailabilityCache, CacheConfig, CacheStatsReport, SlotAvailability};
use teller_events::{BookingEventPublisher, KafkaEventTransport, PublisherConfig};
use teller_identity::{BreakerConfig, CircuitState, GatewayConfig, IdentityGateway, MockIdentityProvider};
use teller_store::app_config::Config;
use teller_store::{DbClient, PgBookingStore, PgSlotStore};

/// Everything the service is built from, injected explicitly. Tests hand in
/// memory backends; `BookingService::from_config` builds the Postgres and
/// Kafka equivalents.
pub struct ServiceComponents {
    pub slots: Arc<dyn SlotStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub provider: Arc<dyn IdentityProvider>,
    pub transport: Arc<dyn EventTransport>,
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    pub publisher: PublisherConfig,
    pub provisioning_deadline: Duration,
}

/// Facade over the booking workflow: orchestrated booking and cancellation,
/// cached availability reads and event-publisher lifecycle.
pub struct BookingService {
    orchestrator: BookingOrchestrator,
    cache: AvailabilityCache,
    gateway: Arc<IdentityGateway>,
    publisher: Arc<BookingEventPublisher>,
}

impl BookingService {
    pub fn new(components: ServiceComponents) -> Self {
        let allocator = Arc::new(SlotAllocator::new(components.slots.clone()));
        let gateway = Arc::new(IdentityGateway::new(
            components.provider,
            components.gateway,
        ));
        let publisher = Arc::new(BookingEventPublisher::spawn(
            components.transport,
            components.publisher,
        ));
        let cache = AvailabilityCache::new(components.slots, components.cache);
        let orchestrator = BookingOrchestrator::new(
            allocator,
            gateway.clone(),
            publisher.clone(),
            components.bookings,
            components.provisioning_deadline,
        );
        Self {
            orchestrator,
            cache,
            gateway,
            publisher,
        }
    }

    /// Production wiring from layered configuration: Postgres stores and the
    /// Kafka transport. The identity provider has no live integration yet,
    /// so the scripted provider stands in behind the same port.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
        let slots: Arc<dyn SlotStore> = Arc::new(PgSlotStore::new(db.pool.clone()));
        let bookings: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db.pool));
        let transport: Arc<dyn EventTransport> =
            Arc::new(KafkaEventTransport::new(&config.kafka.brokers)?);
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(MockIdentityProvider::always_succeed());

        tracing::info!("Booking service wired from configuration");
        Ok(Self::new(ServiceComponents {
            slots,
            bookings,
            provider,
            transport,
            gateway: GatewayConfig {
                call_timeout: Duration::from_millis(config.identity.call_timeout_ms),
                breaker: BreakerConfig {
                    failure_rate_threshold: config.identity.breaker.failure_rate_threshold,
                    sliding_window_size: config.identity.breaker.sliding_window_size,
                    minimum_calls: config.identity.breaker.minimum_calls,
                    open_cooldown: Duration::from_millis(config.identity.breaker.open_cooldown_ms),
                    half_open_max_calls: config.identity.breaker.half_open_max_calls,
                },
                retry: RetryPolicy {
                    max_attempts: config.identity.retry.max_attempts,
                    initial_backoff: Duration::from_millis(config.identity.retry.initial_backoff_ms),
                    multiplier: config.identity.retry.multiplier,
                    jitter: config.identity.retry.jitter,
                },
            },
            cache: CacheConfig {
                ttl: Duration::from_millis(config.cache.ttl_ms),
                max_entries: config.cache.max_entries,
            },
            publisher: PublisherConfig {
                topic: config.kafka.booking_topic.clone(),
                retry: RetryPolicy {
                    max_attempts: config.events.max_attempts,
                    initial_backoff: Duration::from_millis(config.events.initial_backoff_ms),
                    multiplier: config.events.multiplier,
                    jitter: config.events.jitter,
                },
            },
            provisioning_deadline: Duration::from_millis(config.booking.provisioning_deadline_ms),
        }))
    }

    pub async fn book(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let slot_id = request.slot_id;
        let result = self.orchestrator.book(request).await;
        // the reserved counter may have moved on either outcome
        self.cache.invalidate(slot_id);
        result
    }

    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let cancelled = self.orchestrator.cancel(booking_id).await?;
        self.cache.invalidate(cancelled.slot_id);
        Ok(cancelled)
    }

    pub async fn booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.orchestrator.get_booking(booking_id).await
    }

    /// Cached availability for browsing. The booking path never reads this.
    pub async fn availability(&self, slot_id: Uuid) -> Result<SlotAvailability, StoreError> {
        self.cache.get_availability(slot_id).await
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.gateway.breaker_state()
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    /// Wait for every event published so far to be delivered or parked.
    /// Used on shutdown and in tests.
    pub async fn flush_events(&self) {
        self.publisher.flush().await
    }

    pub fn dead_letters(&self) -> Vec<BookingEvent> {
        self.publisher.dead_letters()
    }
}

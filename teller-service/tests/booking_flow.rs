use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use teller_booking::BookingError;
use teller_core::identity::IdentityError;
use teller_core::retry::RetryPolicy;
use teller_core::store::SlotStore;
use teller_domain::{BookingRequest, BookingStatus, TimeSlot};
use teller_engine::allocation::AllocationError;
use teller_engine::cache::CacheConfig;
use teller_events::{MemoryEventTransport, PublisherConfig};
use teller_identity::{
    BreakerConfig, CircuitState, GatewayConfig, MockIdentityProvider, MockOutcome,
};
use teller_service::{BookingService, ServiceComponents};
use teller_store::{MemoryBookingStore, MemorySlotStore};

struct TestEnv {
    service: Arc<BookingService>,
    slots: Arc<MemorySlotStore>,
    provider: Arc<MockIdentityProvider>,
    transport: Arc<MemoryEventTransport>,
    slot_id: Uuid,
}

async fn env_with_gateway(
    capacity: i32,
    provider: Arc<MockIdentityProvider>,
    gateway: GatewayConfig,
) -> TestEnv {
    let slots = Arc::new(MemorySlotStore::new());
    let slot = TimeSlot::new(
        "BR-010".to_string(),
        NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
        NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        capacity,
    );
    let slot_id = slot.id;
    slots.create_slot(&slot).await.unwrap();

    let transport = Arc::new(MemoryEventTransport::new());
    let service = BookingService::new(ServiceComponents {
        slots: slots.clone(),
        bookings: Arc::new(MemoryBookingStore::new()),
        provider: provider.clone(),
        transport: transport.clone(),
        gateway,
        cache: CacheConfig::default(),
        publisher: PublisherConfig {
            topic: "booking-lifecycle".to_string(),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(2),
                multiplier: 2.0,
                jitter: 0.0,
            },
        },
        provisioning_deadline: Duration::from_millis(500),
    });

    TestEnv {
        service: Arc::new(service),
        slots,
        provider,
        transport,
        slot_id,
    }
}

async fn env_with(capacity: i32, provider: MockIdentityProvider) -> TestEnv {
    env_with_gateway(
        capacity,
        Arc::new(provider),
        GatewayConfig {
            call_timeout: Duration::from_millis(100),
            breaker: BreakerConfig {
                minimum_calls: 100, // keep the breaker out of these scenarios
                ..BreakerConfig::default()
            },
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(5),
                multiplier: 2.0,
                jitter: 0.0,
            },
        },
    )
    .await
}

async fn reserved(env: &TestEnv) -> i32 {
    env.slots
        .get_slot(env.slot_id)
        .await
        .unwrap()
        .unwrap()
        .reserved_count
}

fn request(slot_id: Uuid, customer: &str) -> BookingRequest {
    BookingRequest::new(
        customer.to_string(),
        "BR-010".to_string(),
        slot_id,
        format!("{customer}.cred"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_customers_race_for_the_last_unit() {
    let env = env_with(1, MockIdentityProvider::always_succeed()).await;

    let first = {
        let service = env.service.clone();
        let slot_id = env.slot_id;
        tokio::spawn(async move { service.book(request(slot_id, "customer-a")).await })
    };
    let second = {
        let service = env.service.clone();
        let slot_id = env.slot_id;
        tokio::spawn(async move { service.book(request(slot_id, "customer-b")).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(
                r,
                Err(BookingError::Allocation(AllocationError::SlotFull(_)))
            ))
            .count(),
        1
    );
    assert_eq!(reserved(&env).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_of_bookings_respects_capacity() {
    let env = env_with(3, MockIdentityProvider::always_succeed()).await;

    let mut handles = Vec::new();
    for n in 0..8 {
        let service = env.service.clone();
        let slot_id = env.slot_id;
        handles.push(tokio::spawn(async move {
            service
                .book(request(slot_id, &format!("customer-{n}")))
                .await
        }));
    }

    let mut confirmed = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(booking) => {
                assert_eq!(booking.status(), &BookingStatus::Confirmed);
                confirmed += 1;
            }
            Err(BookingError::Allocation(AllocationError::SlotFull(_))) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(confirmed, 3);
    assert_eq!(full, 5);
    assert_eq!(reserved(&env).await, 3);

    env.service.flush_events().await;
    // every booking announced CREATED plus one terminal CONFIRMED or FAILED
    assert_eq!(env.transport.sent().len(), 16);
    assert!(env.service.dead_letters().is_empty());
}

#[tokio::test]
async fn test_provider_timeout_on_nearly_full_slot_restores_count() {
    let provider = MockIdentityProvider::with_script(vec![MockOutcome::Hang]);
    let env = env_with(5, provider).await;
    env.slots
        .try_adjust_reserved(env.slot_id, 4)
        .await
        .unwrap();

    let err = env
        .service
        .book(request(env.slot_id, "customer-z").with_deadline(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BookingError::Identity(IdentityError::Timeout(_))
    ));
    assert_eq!(reserved(&env).await, 4);

    env.service.flush_events().await;
    let payloads: Vec<String> = env
        .transport
        .sent()
        .into_iter()
        .map(|record| record.payload)
        .collect();
    assert!(payloads.iter().any(|payload| payload.contains("FAILED")));
}

#[tokio::test]
async fn test_availability_tracks_mutations_through_invalidation() {
    let env = env_with(3, MockIdentityProvider::always_succeed()).await;

    let before = env.service.availability(env.slot_id).await.unwrap();
    assert_eq!(before.remaining(), 3);

    let booking = env
        .service
        .book(request(env.slot_id, "customer-a"))
        .await
        .unwrap();
    let after = env.service.availability(env.slot_id).await.unwrap();
    assert_eq!(after.remaining(), 2);

    env.service.cancel(booking.id).await.unwrap();
    let restored = env.service.availability(env.slot_id).await.unwrap();
    assert_eq!(restored.remaining(), 3);

    // every mutation dropped the entry, so each read went to the store
    let stats = env.service.cache_stats();
    assert_eq!(stats.miss_count, 3);
    assert_eq!(stats.hit_count, 0);
}

#[tokio::test]
async fn test_availability_is_advisory_between_invalidations() {
    let env = env_with(5, MockIdentityProvider::always_succeed()).await;

    let first = env.service.availability(env.slot_id).await.unwrap();
    assert_eq!(first.remaining(), 5);

    // mutate the store behind the cache's back
    env.slots
        .try_adjust_reserved(env.slot_id, 2)
        .await
        .unwrap();

    // within the TTL the cached value is still served
    let second = env.service.availability(env.slot_id).await.unwrap();
    assert_eq!(second.remaining(), 5);
    assert_eq!(env.service.cache_stats().hit_count, 1);
}

#[tokio::test]
async fn test_breaker_opens_and_fails_fast_end_to_end() {
    let provider = Arc::new(MockIdentityProvider::with_script(vec![
        MockOutcome::Unavailable;
        4
    ]));
    let env = env_with_gateway(
        2,
        provider,
        GatewayConfig {
            call_timeout: Duration::from_millis(100),
            breaker: BreakerConfig {
                failure_rate_threshold: 0.5,
                sliding_window_size: 4,
                minimum_calls: 4,
                open_cooldown: Duration::from_secs(60),
                half_open_max_calls: 1,
            },
            retry: RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(5),
                multiplier: 2.0,
                jitter: 0.0,
            },
        },
    )
    .await;

    for n in 0..4 {
        let err = env
            .service
            .book(request(env.slot_id, &format!("customer-{n}")))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Identity(_)));
    }
    assert_eq!(env.service.breaker_state(), CircuitState::Open);
    assert_eq!(env.provider.calls(), 4);

    let err = env
        .service
        .book(request(env.slot_id, "customer-fast-fail"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Identity(IdentityError::ProviderUnavailable(_))
    ));
    // the rejected call never reached the provider
    assert_eq!(env.provider.calls(), 4);
    // every failed booking handed its reservation back
    assert_eq!(reserved(&env).await, 0);
}

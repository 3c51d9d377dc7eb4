use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use teller_core::identity::IdentityError;
use teller_core::store::{BookingStore, StoreError};
use teller_domain::{
    Booking, BookingEvent, BookingEventKind, BookingRequest, BookingStateError, BookingStatus,
};
use teller_engine::allocation::{AllocationError, ReservationToken, SlotAllocator};
use teller_events::BookingEventPublisher;
use teller_identity::IdentityGateway;

/// Drives one booking through reserve, provision and confirm, compensating
/// on failure.
///
/// The saga order is fixed: capacity is taken before the identity provider
/// is called, and every failure after the reservation releases that capacity
/// before the booking is marked FAILED. State changes are persisted before
/// their lifecycle event is published.
pub struct BookingOrchestrator {
    allocator: Arc<SlotAllocator>,
    gateway: Arc<IdentityGateway>,
    publisher: Arc<BookingEventPublisher>,
    bookings: Arc<dyn BookingStore>,
    provisioning_deadline: Duration,
}

impl BookingOrchestrator {
    pub fn new(
        allocator: Arc<SlotAllocator>,
        gateway: Arc<IdentityGateway>,
        publisher: Arc<BookingEventPublisher>,
        bookings: Arc<dyn BookingStore>,
        provisioning_deadline: Duration,
    ) -> Self {
        Self {
            allocator,
            gateway,
            publisher,
            bookings,
            provisioning_deadline,
        }
    }

    pub async fn book(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let mut booking = Booking::new(&request);
        self.bookings.create_booking(&booking).await?;
        self.publish_event(&booking, BookingEventKind::Created);
        tracing::info!(
            booking_id = %booking.id,
            slot_id = %booking.slot_id,
            reference = %booking.reference,
            "Booking accepted"
        );

        // Step 1: take capacity
        let mut token = match self.allocator.reserve(booking.slot_id, 1).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(booking_id = %booking.id, "Slot reservation failed: {}", err);
                self.fail_booking(&mut booking).await;
                return Err(BookingError::Allocation(err));
            }
        };

        booking.transition(BookingStatus::Reserved)?;
        if let Err(err) = self.bookings.update_booking(&booking).await {
            self.compensate(&mut booking, &mut token).await;
            return Err(BookingError::Store(err));
        }

        // Step 2: provision the credential within the deadline
        let deadline = request.deadline.unwrap_or(self.provisioning_deadline);
        let provisioned = match timeout(
            deadline,
            self.gateway
                .provision_credential(booking.id, request.requested_credential_name.expose()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Timeout(deadline)),
        };

        match provisioned {
            Ok(credential_id) => {
                self.allocator.commit(&mut token);
                booking.set_credential(credential_id);
                booking.transition(BookingStatus::Confirmed)?;
                self.bookings.update_booking(&booking).await?;
                self.publish_event(&booking, BookingEventKind::Confirmed);
                tracing::info!(
                    booking_id = %booking.id,
                    reference = %booking.reference,
                    "Booking confirmed"
                );
                Ok(booking)
            }
            Err(err) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    "Identity provisioning failed, compensating: {}",
                    err
                );
                self.compensate(&mut booking, &mut token).await;
                Err(BookingError::Identity(err))
            }
        }
    }

    /// Cancel a confirmed booking and hand its capacity back.
    ///
    /// Capacity is returned before the status is persisted, so a crash in
    /// between leaves a retryable CONFIRMED row; the repeated release is
    /// absorbed by the counter floor.
    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let mut booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        booking.transition(BookingStatus::Cancelled)?;
        self.allocator
            .release_committed(booking.slot_id, 1)
            .await?;
        self.bookings.update_booking(&booking).await?;
        self.publish_event(&booking, BookingEventKind::Cancelled);
        tracing::info!(booking_id = %booking.id, "Booking cancelled");
        Ok(booking)
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Release capacity and mark the booking FAILED. Errors from the
    /// compensation itself are logged, never surfaced over the original
    /// failure.
    async fn compensate(&self, booking: &mut Booking, token: &mut ReservationToken) {
        if let Err(err) = self.allocator.release(token).await {
            tracing::error!(
                booking_id = %booking.id,
                slot_id = %booking.slot_id,
                "Compensating release failed, capacity may leak: {}",
                err
            );
        }
        self.fail_booking(booking).await;
    }

    async fn fail_booking(&self, booking: &mut Booking) {
        if booking.transition(BookingStatus::Failed).is_err() {
            // already terminal
            return;
        }
        if let Err(err) = self.bookings.update_booking(booking).await {
            tracing::error!(booking_id = %booking.id, "Failed to persist FAILED status: {}", err);
        }
        self.publish_event(booking, BookingEventKind::Failed);
    }

    fn publish_event(&self, booking: &Booking, kind: BookingEventKind) {
        self.publisher
            .publish(BookingEvent::new(booking.id, booking.slot_id, kind));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Slot allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Identity provisioning failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("Booking state error: {0}")]
    State(#[from] BookingStateError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::pii::Masked;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Reserved,
    Confirmed,
    Failed,
    Cancelled,
}

impl BookingStatus {
    /// Legal moves of the state machine. Everything else is rejected.
    pub fn can_transition_to(&self, next: &BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Reserved)
                | (BookingStatus::Pending, BookingStatus::Failed)
                | (BookingStatus::Reserved, BookingStatus::Confirmed)
                | (BookingStatus::Reserved, BookingStatus::Failed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Reserved => "RESERVED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Failed => "FAILED",
            BookingStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BookingStatus {
    type Err = BookingStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "RESERVED" => Ok(BookingStatus::Reserved),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "FAILED" => Ok(BookingStatus::Failed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(BookingStateError::UnknownStatus(other.to_string())),
        }
    }
}

/// Identifier of the provider-side credential tied to a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialId(pub String);

impl CredentialId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to book one slot for one customer. Immutable once accepted
/// for processing.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub customer_id: String,
    pub branch_id: String,
    pub slot_id: Uuid,
    /// Credential name the customer asked for; masked in Debug output
    pub requested_credential_name: Masked<String>,
    /// Budget for the identity-provisioning step; falls back to the
    /// configured default when absent
    pub deadline: Option<Duration>,
}

impl BookingRequest {
    pub fn new(
        customer_id: String,
        branch_id: String,
        slot_id: Uuid,
        requested_credential_name: String,
    ) -> Self {
        Self {
            customer_id,
            branch_id,
            slot_id,
            requested_credential_name: Masked(requested_credential_name),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The single source of truth for one appointment booking.
///
/// `status` and `credential_id` are private: status moves only through
/// `transition`, and the credential is attached only after the identity
/// provider succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub branch_id: String,
    pub customer_id: String,
    pub reference: String,
    status: BookingStatus,
    credential_id: Option<CredentialId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(request: &BookingRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slot_id: request.slot_id,
            branch_id: request.branch_id.clone(),
            customer_id: request.customer_id.clone(),
            reference: generate_reference(&now),
            status: BookingStatus::Pending,
            credential_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a booking from its persisted representation
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        slot_id: Uuid,
        branch_id: String,
        customer_id: String,
        reference: String,
        status: BookingStatus,
        credential_id: Option<CredentialId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            slot_id,
            branch_id,
            customer_id,
            reference,
            status,
            credential_id,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> &BookingStatus {
        &self.status
    }

    pub fn credential_id(&self) -> Option<&CredentialId> {
        self.credential_id.as_ref()
    }

    /// Move the booking along the state machine
    pub fn transition(&mut self, next: BookingStatus) -> Result<(), BookingStateError> {
        if !self.status.can_transition_to(&next) {
            return Err(BookingStateError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach the provisioned credential (identity provider succeeded)
    pub fn set_credential(&mut self, credential_id: CredentialId) {
        self.credential_id = Some(credential_id);
        self.updated_at = Utc::now();
    }
}

/// Human-facing booking reference, e.g. APT-2026-0042137
fn generate_reference(created_at: &DateTime<Utc>) -> String {
    let sequence: u32 = rand::thread_rng().gen_range(0..10_000_000);
    format!("APT-{}-{:07}", created_at.year(), sequence)
}

#[derive(Debug, thiserror::Error)]
pub enum BookingStateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown booking status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest::new(
            "customer-77".to_string(),
            "BR-001".to_string(),
            Uuid::new_v4(),
            "n.mokoena".to_string(),
        )
    }

    #[test]
    fn test_booking_lifecycle() {
        let mut booking = Booking::new(&request());
        assert_eq!(booking.status(), &BookingStatus::Pending);
        assert!(booking.credential_id().is_none());

        // Pending → Reserved → Confirmed
        booking.transition(BookingStatus::Reserved).unwrap();
        booking.transition(BookingStatus::Confirmed).unwrap();
        booking.set_credential(CredentialId("cred-9001".to_string()));
        assert_eq!(booking.status(), &BookingStatus::Confirmed);
        assert_eq!(booking.credential_id().unwrap().as_str(), "cred-9001");

        // Confirmed → Cancelled
        booking.transition(BookingStatus::Cancelled).unwrap();
        assert_eq!(booking.status(), &BookingStatus::Cancelled);
    }

    #[test]
    fn test_failure_exits() {
        let mut from_pending = Booking::new(&request());
        from_pending.transition(BookingStatus::Failed).unwrap();
        assert_eq!(from_pending.status(), &BookingStatus::Failed);

        let mut from_reserved = Booking::new(&request());
        from_reserved.transition(BookingStatus::Reserved).unwrap();
        from_reserved.transition(BookingStatus::Failed).unwrap();
        assert_eq!(from_reserved.status(), &BookingStatus::Failed);
    }

    #[test]
    fn test_invalid_transition() {
        let mut booking = Booking::new(&request());

        // Cannot confirm without reserving first
        let result = booking.transition(BookingStatus::Confirmed);
        assert!(result.is_err());

        // Terminal states stay terminal
        booking.transition(BookingStatus::Failed).unwrap();
        assert!(booking.transition(BookingStatus::Reserved).is_err());
        assert!(booking.transition(BookingStatus::Cancelled).is_err());
    }

    #[test]
    fn test_reference_shape() {
        let booking = Booking::new(&request());
        let parts: Vec<&str> = booking.reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "APT");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Reserved,
            BookingStatus::Confirmed,
            BookingStatus::Failed,
            BookingStatus::Cancelled,
        ] {
            let parsed: BookingStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("ARCHIVED".parse::<BookingStatus>().is_err());
    }
}

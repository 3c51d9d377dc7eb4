use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use teller_core::store::{AdjustOutcome, BookingStore, SlotStore, StoreError};
use teller_domain::{Booking, BookingStatus, CredentialId, TimeSlot};

#[derive(Clone)]
pub struct DbClient {
    pub pool: PgPool,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Postgres-backed slot store.
///
/// Expects a `time_slots` table with columns (id UUID PK, branch_id TEXT,
/// date DATE, start_time TIME, capacity INT, reserved_count INT,
/// created_at/updated_at TIMESTAMPTZ). Schema management is host-owned.
pub struct PgSlotStore {
    pool: PgPool,
}

impl PgSlotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct SlotRow {
    id: Uuid,
    branch_id: String,
    date: chrono::NaiveDate,
    start_time: chrono::NaiveTime,
    capacity: i32,
    reserved_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<SlotRow> for TimeSlot {
    fn from(row: SlotRow) -> Self {
        TimeSlot {
            id: row.id,
            branch_id: row.branch_id,
            date: row.date,
            start_time: row.start_time,
            capacity: row.capacity,
            reserved_count: row.reserved_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn create_slot(&self, slot: &TimeSlot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO time_slots (id, branch_id, date, start_time, capacity, reserved_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(slot.id)
        .bind(&slot.branch_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.capacity)
        .bind(slot.reserved_count)
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<TimeSlot>, StoreError> {
        let row = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, branch_id, date, start_time, capacity, reserved_count, created_at, updated_at
            FROM time_slots
            WHERE id = $1
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(TimeSlot::from))
    }

    /// The guard inside the UPDATE makes the bounds check and the write one
    /// statement, so concurrent writers cannot interleave on a slot row.
    async fn try_adjust_reserved(
        &self,
        slot_id: Uuid,
        delta: i32,
    ) -> Result<AdjustOutcome, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE time_slots
            SET reserved_count = reserved_count + $2, updated_at = NOW()
            WHERE id = $1
              AND reserved_count + $2 >= 0
              AND reserved_count + $2 <= capacity
            RETURNING reserved_count
            "#,
        )
        .bind(slot_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match updated {
            Some(row) => {
                let reserved: i32 = row.try_get("reserved_count").map_err(backend)?;
                Ok(AdjustOutcome::Applied(reserved))
            }
            None => {
                let exists = sqlx::query("SELECT 1 FROM time_slots WHERE id = $1")
                    .bind(slot_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(backend)?;
                if exists.is_some() {
                    Ok(AdjustOutcome::Rejected)
                } else {
                    Err(StoreError::SlotNotFound(slot_id))
                }
            }
        }
    }
}

/// Postgres-backed booking store.
///
/// Expects a `bookings` table with columns (id UUID PK, slot_id UUID,
/// branch_id TEXT, customer_id TEXT, reference TEXT, status TEXT,
/// credential_id TEXT NULL, created_at/updated_at TIMESTAMPTZ).
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    slot_id: Uuid,
    branch_id: String,
    customer_id: String,
    reference: String,
    status: String,
    credential_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let status: BookingStatus = self
            .status
            .parse()
            .map_err(|err: teller_domain::BookingStateError| StoreError::Backend(err.to_string()))?;

        Ok(Booking::restore(
            self.id,
            self.slot_id,
            self.branch_id,
            self.customer_id,
            self.reference,
            status,
            self.credential_id.map(CredentialId),
            self.created_at,
            self.updated_at,
        ))
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, slot_id, branch_id, customer_id, reference, status, credential_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.slot_id)
        .bind(&booking.branch_id)
        .bind(&booking.customer_id)
        .bind(&booking.reference)
        .bind(booking.status().to_string())
        .bind(booking.credential_id().map(|c| c.as_str()))
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2, credential_id = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status().to_string())
        .bind(booking.credential_id().map(|c| c.as_str()))
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::BookingNotFound(booking.id));
        }
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, slot_id, branch_id, customer_id, reference, status, credential_id, created_at, updated_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(BookingRow::into_booking).transpose()
    }
}

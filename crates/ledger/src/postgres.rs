use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{BookingLedger, check_transition};
use crate::{
    Booking, BookingId, BookingStatus, ClinicId, LedgerError, NewBooking, PatientId, Result,
    ServiceId, SlotId,
};

const BOOKING_COLUMNS: &str =
    "id, patient_id, clinic_id, service_id, slot_id, status, notes, created_at, updated_at";

/// PostgreSQL-backed booking ledger.
#[derive(Clone)]
pub struct PostgresBookingLedger {
    pool: PgPool,
}

impl PostgresBookingLedger {
    /// Creates a new PostgreSQL booking ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_booking(row: PgRow) -> Result<Booking> {
        let status: String = row.try_get("status")?;
        Ok(Booking {
            id: BookingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            patient_id: PatientId::from_uuid(row.try_get::<Uuid, _>("patient_id")?),
            clinic_id: ClinicId::from_uuid(row.try_get::<Uuid, _>("clinic_id")?),
            service_id: ServiceId::from_uuid(row.try_get::<Uuid, _>("service_id")?),
            slot_id: SlotId::from_uuid(row.try_get::<Uuid, _>("slot_id")?),
            status: status.parse().map_err(LedgerError::Corrupt)?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl BookingLedger for PostgresBookingLedger {
    async fn create(&self, new: NewBooking) -> Result<Booking> {
        let booking = Booking::pending(new);

        sqlx::query(
            r#"
            INSERT INTO bookings (id, patient_id, clinic_id, service_id, slot_id, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.patient_id.as_uuid())
        .bind(booking.clinic_id.as_uuid())
        .bind(booking.service_id.as_uuid())
        .bind(booking.slot_id.as_uuid())
        .bind(booking.status.as_str())
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("bookings_pkey") {
                    return LedgerError::DuplicateBooking(booking.id);
                }
            }
            LedgerError::Database(e)
        })?;

        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Booking> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::BookingNotFound(id))?;

        Self::row_to_booking(row)
    }

    async fn find_by_patient(&self, patient_id: PatientId) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE patient_id = $1
            ORDER BY created_at DESC, seq DESC
            "#
        ))
        .bind(patient_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn find_active_by_slot(&self, slot_id: SlotId) -> Result<Vec<Booking>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE slot_id = $1 AND status IN ('PENDING', 'CONFIRMED')
            ORDER BY seq ASC
            "#
        ))
        .bind(slot_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking> {
        check_transition(from, to)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_booking(row);
        }

        let current = self.get(id).await?;
        tracing::debug!(
            booking_id = %id,
            expected = %from,
            actual = %current.status,
            "booking status changed concurrently"
        );
        Err(LedgerError::StatusMismatch {
            booking_id: id,
            expected: from,
            actual: current.status,
        })
    }
}

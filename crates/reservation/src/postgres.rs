//! PostgreSQL implementations of the journal and the directory.

use async_trait::async_trait;
use common::{BookingId, ClinicId, CompensationId, PatientId, ServiceId, SlotId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::directory::{self, Catalog, Clinic, DirectoryError, Patient, PatientDirectory, Service};
use crate::journal::{
    self, CompensationJournal, CompensationOutcome, CompensationRecord, JournalError,
    NewCompensation,
};
use crate::state::CompensationState;

const COMPENSATION_COLUMNS: &str =
    "id, kind, slot_id, booking_id, state, attempts, last_error, created_at, updated_at";

/// PostgreSQL-backed compensation journal.
#[derive(Clone)]
pub struct PostgresCompensationJournal {
    pool: PgPool,
}

impl PostgresCompensationJournal {
    /// Creates a new PostgreSQL journal.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> journal::Result<CompensationRecord> {
        let kind: String = row.try_get("kind")?;
        let state: String = row.try_get("state")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(CompensationRecord {
            id: CompensationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            kind: kind.parse().map_err(JournalError::Corrupt)?,
            slot_id: SlotId::from_uuid(row.try_get::<Uuid, _>("slot_id")?),
            booking_id: BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
            state: state.parse().map_err(JournalError::Corrupt)?,
            attempts: u32::try_from(attempts)
                .map_err(|_| JournalError::Corrupt(format!("negative attempts: {attempts}")))?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn attempts_to_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl CompensationJournal for PostgresCompensationJournal {
    async fn record(&self, new: NewCompensation) -> journal::Result<CompensationRecord> {
        let record = CompensationRecord::pending(new);

        sqlx::query(
            r#"
            INSERT INTO compensations (id, kind, slot_id, booking_id, state, attempts, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.slot_id.as_uuid())
        .bind(record.booking_id.as_uuid())
        .bind(record.state.as_str())
        .bind(attempts_to_i32(record.attempts))
        .bind(&record.last_error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, id: CompensationId) -> journal::Result<CompensationRecord> {
        let row = sqlx::query(&format!(
            "SELECT {COMPENSATION_COLUMNS} FROM compensations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JournalError::NotFound(id))?;

        Self::row_to_record(row)
    }

    async fn update(
        &self,
        id: CompensationId,
        outcome: CompensationOutcome,
    ) -> journal::Result<CompensationRecord> {
        if outcome.state == CompensationState::Pending {
            let current = self.get(id).await?;
            return Err(JournalError::InvalidState {
                id,
                from: current.state,
                to: outcome.state,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE compensations
            SET state = $2,
                attempts = attempts + $3,
                last_error = COALESCE($4, last_error),
                updated_at = NOW()
            WHERE id = $1 AND state IN ('Pending', 'Escalated')
            RETURNING {COMPENSATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(outcome.state.as_str())
        .bind(attempts_to_i32(outcome.attempts))
        .bind(&outcome.last_error)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_record(row);
        }

        let current = self.get(id).await?;
        Err(JournalError::InvalidState {
            id,
            from: current.state,
            to: outcome.state,
        })
    }

    async fn open_entries(&self) -> journal::Result<Vec<CompensationRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMPENSATION_COLUMNS}
            FROM compensations
            WHERE state IN ('Pending', 'Escalated')
            ORDER BY seq ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn open_entries_for_slot(
        &self,
        slot_id: SlotId,
    ) -> journal::Result<Vec<CompensationRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMPENSATION_COLUMNS}
            FROM compensations
            WHERE slot_id = $1 AND state IN ('Pending', 'Escalated')
            ORDER BY seq ASC
            "#
        ))
        .bind(slot_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}

/// PostgreSQL-backed patient directory and catalog.
#[derive(Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Creates a new PostgreSQL directory.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatientDirectory for PostgresDirectory {
    async fn resolve_patient(&self, user_id: UserId) -> directory::Result<Patient> {
        let row = sqlx::query("SELECT id, user_id, display_name FROM patients WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DirectoryError::PatientNotFound(user_id))?;

        Ok(Patient {
            id: PatientId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            display_name: row.try_get("display_name")?,
        })
    }
}

#[async_trait]
impl Catalog for PostgresDirectory {
    async fn clinic(&self, id: ClinicId) -> directory::Result<Option<Clinic>> {
        let row = sqlx::query("SELECT id, name, address, phone FROM clinics WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> directory::Result<Clinic> {
            Ok(Clinic {
                id: ClinicId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                address: row.try_get("address")?,
                phone: row.try_get("phone")?,
            })
        })
        .transpose()
    }

    async fn service(&self, id: ServiceId) -> directory::Result<Option<Service>> {
        let row = sqlx::query(
            r#"
            SELECT id, clinic_id, name, description, duration_min, price_cents
            FROM services
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> directory::Result<Service> {
            let duration_min: i32 = row.try_get("duration_min")?;
            Ok(Service {
                id: ServiceId::from_uuid(row.try_get::<Uuid, _>("id")?),
                clinic_id: ClinicId::from_uuid(row.try_get::<Uuid, _>("clinic_id")?),
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                duration_min: u32::try_from(duration_min).map_err(|_| {
                    DirectoryError::Corrupt(format!("negative duration: {duration_min}"))
                })?,
                price_cents: row.try_get("price_cents")?,
            })
        })
        .transpose()
    }
}

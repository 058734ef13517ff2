use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CompensationId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ClinicId, NewSlot, Result, ServiceId, Slot, SlotId, SlotStoreError, store::SlotStore,
};

const SLOT_COLUMNS: &str = "id, service_id, clinic_id, start_time, end_time, capacity, available";

/// PostgreSQL-backed slot store.
///
/// Reserve and release are single `UPDATE ... WHERE ... RETURNING` statements,
/// so the row lock taken by PostgreSQL is the per-slot lock. A CHECK
/// constraint on the table enforces `0 <= available <= capacity` as well.
#[derive(Clone)]
pub struct PostgresSlotStore {
    pool: PgPool,
}

impl PostgresSlotStore {
    /// Creates a new PostgreSQL slot store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations for every reservation table.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_slot(row: PgRow) -> Result<Slot> {
        Ok(Slot {
            id: SlotId::from_uuid(row.try_get::<Uuid, _>("id")?),
            service_id: ServiceId::from_uuid(row.try_get::<Uuid, _>("service_id")?),
            clinic_id: ClinicId::from_uuid(row.try_get::<Uuid, _>("clinic_id")?),
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            capacity: column_to_u32(&row, "capacity")?,
            available: column_to_u32(&row, "available")?,
        })
    }

    /// Distinguishes "no such slot" from a failed condition after a
    /// conditional update matched no row.
    async fn slot_exists(&self, id: SlotId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM slots WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn column_to_u32(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| SlotStoreError::InvalidSlot(format!("negative {column}: {value}")))
}

#[async_trait]
impl SlotStore for PostgresSlotStore {
    async fn create_slot(&self, new: NewSlot) -> Result<Slot> {
        let slot = Slot::from_new(new)?;
        let capacity = i32::try_from(slot.capacity)
            .map_err(|_| SlotStoreError::InvalidSlot("capacity out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO slots (id, service_id, clinic_id, start_time, end_time, capacity, available)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(slot.id.as_uuid())
        .bind(slot.service_id.as_uuid())
        .bind(slot.clinic_id.as_uuid())
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(capacity)
        .execute(&self.pool)
        .await?;

        Ok(slot)
    }

    async fn get_slot(&self, id: SlotId) -> Result<Slot> {
        let row = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SlotStoreError::SlotNotFound(id))?;

        Self::row_to_slot(row)
    }

    async fn try_reserve(&self, id: SlotId) -> Result<Slot> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE slots
            SET available = available - 1
            WHERE id = $1 AND available > 0
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_slot(row),
            None if self.slot_exists(id).await? => Err(SlotStoreError::SlotUnavailable(id)),
            None => Err(SlotStoreError::SlotNotFound(id)),
        }
    }

    async fn release(&self, id: SlotId) -> Result<Slot> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE slots
            SET available = available + 1
            WHERE id = $1 AND available < capacity
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_slot(row);
        }

        let slot = self.get_slot(id).await?;
        Err(SlotStoreError::OverRelease {
            slot_id: id,
            capacity: slot.capacity,
        })
    }

    async fn release_once(&self, id: SlotId, key: CompensationId) -> Result<Slot> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO slot_releases (release_key, slot_id, released_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (release_key) DO NOTHING
            "#,
        )
        .bind(key.as_uuid())
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            tracing::debug!(slot_id = %id, release_key = %key, "release already applied");
            return self.get_slot(id).await;
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE slots
            SET available = available + 1
            WHERE id = $1 AND available < capacity
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                tx.commit().await?;
                Self::row_to_slot(row)
            }
            None => {
                tx.rollback().await?;
                let slot = self.get_slot(id).await?;
                Err(SlotStoreError::OverRelease {
                    slot_id: id,
                    capacity: slot.capacity,
                })
            }
        }
    }

    async fn find_available(
        &self,
        service_id: ServiceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM slots
            WHERE service_id = $1 AND available > 0 AND start_time >= $2 AND start_time <= $3
            ORDER BY start_time ASC, id ASC
            "#
        ))
        .bind(service_id.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_slot).collect()
    }
}

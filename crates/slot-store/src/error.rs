use thiserror::Error;

use crate::SlotId;

/// Errors that can occur when interacting with the slot store.
#[derive(Debug, Error)]
pub enum SlotStoreError {
    /// No slot exists with the given id.
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// The slot had no remaining capacity at the instant of the attempt.
    #[error("Slot {0} is no longer available")]
    SlotUnavailable(SlotId),

    /// A release was attempted on a slot that is already at full capacity.
    #[error("Slot {slot_id} is already at capacity {capacity}")]
    OverRelease { slot_id: SlotId, capacity: u32 },

    /// The slot definition is malformed.
    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    /// The storage backend could not be reached. Safe to retry.
    #[error("Slot storage unavailable: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl SlotStoreError {
    /// Returns true if the failure left the slot untouched and the same
    /// operation may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SlotStoreError::Backend(_) => true,
            SlotStoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for slot store operations.
pub type Result<T> = std::result::Result<T, SlotStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_transient() {
        assert!(SlotStoreError::Backend("connection reset".to_string()).is_transient());
        assert!(SlotStoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn business_conflicts_are_not_transient() {
        let slot_id = SlotId::new();
        assert!(!SlotStoreError::SlotUnavailable(slot_id).is_transient());
        assert!(!SlotStoreError::SlotNotFound(slot_id).is_transient());
        assert!(
            !SlotStoreError::OverRelease {
                slot_id,
                capacity: 1
            }
            .is_transient()
        );
        assert!(!SlotStoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}

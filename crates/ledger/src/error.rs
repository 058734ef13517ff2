use thiserror::Error;

use crate::{BookingId, BookingStatus};

/// Errors that can occur when interacting with the booking ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No booking exists with the given id.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// A booking with the same id was already recorded.
    #[error("Booking already exists: {0}")]
    DuplicateBooking(BookingId),

    /// The stored status did not match the expected one.
    #[error("Booking {booking_id} is {actual}, expected {expected}")]
    StatusMismatch {
        booking_id: BookingId,
        expected: BookingStatus,
        actual: BookingStatus,
    },

    /// The state machine does not allow this transition.
    #[error("Transition from {from} to {to} is not allowed")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt booking record: {0}")]
    Corrupt(String),

    /// The storage backend could not be reached. Safe to retry.
    #[error("Ledger storage unavailable: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Returns true if the failure left the ledger untouched and the same
    /// operation may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Backend(_) => true,
            LedgerError::Database(err) => matches!(
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

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

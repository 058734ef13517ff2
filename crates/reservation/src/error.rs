//! Reservation error types.

use ledger::{BookingId, BookingStatus, LedgerError};
use slot_store::{SlotId, SlotStoreError};
use thiserror::Error;

use common::{CompensationId, UserId};

use crate::directory::DirectoryError;
use crate::journal::JournalError;

/// Caller-facing classification of a reservation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The referenced patient, slot or booking does not exist (or is not
    /// visible to the caller).
    NotFound,
    /// The request lost against the current state: no capacity left, already
    /// cancelled, or a forbidden transition.
    Conflict,
    /// The request itself is malformed.
    Validation,
    /// Storage failure or a detected capacity/ledger divergence.
    Internal,
}

impl ErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during reservation operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The caller's identity does not map to a patient.
    #[error("Patient not found for user {0}")]
    PatientNotFound(UserId),

    /// No slot exists with the given id.
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// The booking does not exist or is not owned by the caller.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The slot had no remaining capacity.
    #[error("Slot {0} is no longer available")]
    SlotUnavailable(SlotId),

    /// The booking was already cancelled.
    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),

    /// The booking lifecycle does not allow the requested transition.
    #[error("Booking {booking_id} cannot move from {from} to {to}")]
    InvalidTransition {
        booking_id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    },

    /// Capacity would exceed the slot's total.
    #[error("Slot {slot_id} is already at capacity {capacity}")]
    OverRelease { slot_id: SlotId, capacity: u32 },

    /// The slot does not belong to the requested service or clinic.
    #[error("Slot {slot_id} does not match the requested {field}")]
    SlotMismatch { slot_id: SlotId, field: &'static str },

    /// The request failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A compensation exhausted its retries; slot capacity and the ledger
    /// disagree until the journal entry is resumed.
    #[error("Compensation {compensation_id} for slot {slot_id} escalated: {reason}")]
    Inconsistency {
        compensation_id: CompensationId,
        slot_id: SlotId,
        reason: String,
    },

    /// Slot storage failure.
    #[error("Slot store error: {0}")]
    SlotStore(SlotStoreError),

    /// Ledger storage failure.
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    /// Compensation journal failure.
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Patient directory or catalog failure.
    #[error("Directory error: {0}")]
    Directory(DirectoryError),
}

impl ReservationError {
    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::PatientNotFound(_)
            | ReservationError::SlotNotFound(_)
            | ReservationError::BookingNotFound(_) => ErrorKind::NotFound,
            ReservationError::SlotUnavailable(_)
            | ReservationError::AlreadyCancelled(_)
            | ReservationError::InvalidTransition { .. }
            | ReservationError::OverRelease { .. } => ErrorKind::Conflict,
            ReservationError::SlotMismatch { .. } | ReservationError::Validation(_) => {
                ErrorKind::Validation
            }
            ReservationError::Inconsistency { .. }
            | ReservationError::SlotStore(_)
            | ReservationError::Ledger(_)
            | ReservationError::Journal(_)
            | ReservationError::Directory(_) => ErrorKind::Internal,
        }
    }
}

impl From<SlotStoreError> for ReservationError {
    fn from(err: SlotStoreError) -> Self {
        match err {
            SlotStoreError::SlotNotFound(id) => ReservationError::SlotNotFound(id),
            SlotStoreError::SlotUnavailable(id) => ReservationError::SlotUnavailable(id),
            SlotStoreError::OverRelease { slot_id, capacity } => {
                ReservationError::OverRelease { slot_id, capacity }
            }
            SlotStoreError::InvalidSlot(reason) => ReservationError::Validation(reason),
            other => ReservationError::SlotStore(other),
        }
    }
}

impl From<LedgerError> for ReservationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::BookingNotFound(id) => ReservationError::BookingNotFound(id),
            LedgerError::StatusMismatch {
                booking_id,
                expected,
                actual: BookingStatus::Cancelled,
            } if expected != BookingStatus::Cancelled => {
                ReservationError::AlreadyCancelled(booking_id)
            }
            other => ReservationError::Ledger(other),
        }
    }
}

impl From<DirectoryError> for ReservationError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::PatientNotFound(user_id) => ReservationError::PatientNotFound(user_id),
            other => ReservationError::Directory(other),
        }
    }
}

/// Convenience type alias for reservation results.
pub type Result<T> = std::result::Result<T, ReservationError>;

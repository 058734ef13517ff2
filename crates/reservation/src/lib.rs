//! Reservation engine for the slot booking system.
//!
//! This crate ties slot capacity to the booking lifecycle:
//! - `ReservationEngine` reserves capacity and records bookings, and gives
//!   capacity back on cancellation
//! - `CompensationJournal` records every release that undoes a reservation,
//!   so a failed or interrupted release can be resumed without double counting
//! - `PatientDirectory` and `Catalog` are the read-only collaborators the
//!   engine resolves patients and booking details from
//!
//! The slot store and the ledger share no transaction. Instead each
//! cross-store step is a small saga: reserve, then record; on failure,
//! journal and release.

pub mod details;
pub mod directory;
pub mod engine;
pub mod error;
pub mod journal;
pub mod postgres;
pub mod state;
mod telemetry;

pub use details::{BookingDetails, CompensationReport, SlotAccounting, SlotSummary};
pub use directory::{
    Catalog, Clinic, DirectoryError, InMemoryDirectory, Patient, PatientDirectory, Service,
};
pub use engine::{CreateBooking, EngineConfig, MAX_NOTES_LEN, ReservationEngine};
pub use error::{ErrorKind, ReservationError, Result};
pub use journal::{
    CompensationJournal, CompensationKind, CompensationOutcome, CompensationRecord,
    InMemoryCompensationJournal, JournalError, NewCompensation,
};
pub use postgres::{PostgresCompensationJournal, PostgresDirectory};
pub use state::CompensationState;

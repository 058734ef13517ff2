//! Booking ledger for the reservation system.
//!
//! This crate provides:
//! - `BookingStatus`, the booking lifecycle state machine
//! - `BookingLedger`, the storage trait with compare-and-set transitions
//! - In-memory and PostgreSQL ledger implementations

pub mod booking;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod status;
pub mod store;

pub use booking::{Booking, NewBooking};
pub use common::{BookingId, ClinicId, PatientId, ServiceId, SlotId};
pub use error::{LedgerError, Result};
pub use memory::InMemoryBookingLedger;
pub use postgres::PostgresBookingLedger;
pub use status::BookingStatus;
pub use store::BookingLedger;

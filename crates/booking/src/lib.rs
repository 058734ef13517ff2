//! Caller-facing booking service.
//!
//! `BookingService` resolves who is calling and delegates to the
//! reservation engine. It is the only surface request handlers use.

pub mod caller;
pub mod service;

pub use caller::CallerIdentity;
pub use reservation::{BookingDetails, ErrorKind, ReservationError, Result};
pub use service::{BookingService, CreateBookingRequest};

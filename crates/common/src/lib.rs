//! Shared types for the slot reservation system.

pub mod retry;
pub mod types;

pub use retry::RetryPolicy;
pub use types::{BookingId, ClinicId, CompensationId, PatientId, ServiceId, SlotId, UserId};

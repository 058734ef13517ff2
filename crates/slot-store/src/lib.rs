//! Slot storage for the reservation system.
//!
//! A slot is a bookable time window with a fixed capacity. The store's
//! contract is that `try_reserve` and `release` are single linearizable
//! conditional updates, so `0 <= available <= capacity` holds at every
//! observable instant no matter how callers interleave.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod slot;
pub mod store;

pub use common::{ClinicId, ServiceId, SlotId};
pub use error::{Result, SlotStoreError};
pub use memory::InMemorySlotStore;
pub use postgres::PostgresSlotStore;
pub use slot::{NewSlot, Slot};
pub use store::SlotStore;

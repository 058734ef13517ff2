//! Read-side projections of bookings.

use chrono::{DateTime, Utc};
use ledger::Booking;
use serde::{Deserialize, Serialize};
use slot_store::Slot;

use crate::directory::{Clinic, Service};

/// The slot fields shown alongside a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub available: u32,
}

impl From<&Slot> for SlotSummary {
    fn from(slot: &Slot) -> Self {
        Self {
            start_time: slot.start_time,
            end_time: slot.end_time,
            capacity: slot.capacity,
            available: slot.available,
        }
    }
}

/// A booking joined with its slot and catalog entries. Computed at read
/// time, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub slot: SlotSummary,
    pub service: Option<Service>,
    pub clinic: Option<Clinic>,
}

/// Result of re-running open journal entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompensationReport {
    pub applied: usize,
    pub skipped: usize,
    pub escalated: usize,
}

/// Capacity bookkeeping for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotAccounting {
    pub capacity: u32,
    pub available: u32,
    /// Pending or confirmed bookings referencing the slot.
    pub active_bookings: u32,
    /// Journal entries still owing capacity back to the slot.
    pub open_compensations: u32,
}

impl SlotAccounting {
    /// True when every unit of capacity is either available, held by an
    /// active booking, or owed back by an open compensation.
    ///
    /// Only meaningful while no reservation is in flight on the slot.
    pub fn is_consistent(&self) -> bool {
        u64::from(self.available) + u64::from(self.active_bookings) + u64::from(self.open_compensations)
            == u64::from(self.capacity)
    }
}

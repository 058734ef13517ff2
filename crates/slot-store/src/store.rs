use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::CompensationId;

use crate::{NewSlot, Result, ServiceId, Slot, SlotId};

/// Core trait for slot store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Reserve and release
/// are conditional updates on a single slot record: the check and the write
/// happen as one linearizable step, never as a read followed by a write.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Creates a slot with all of its capacity available.
    async fn create_slot(&self, new: NewSlot) -> Result<Slot>;

    /// Loads a slot by id.
    ///
    /// Fails with `SlotNotFound` if it doesn't exist.
    async fn get_slot(&self, id: SlotId) -> Result<Slot>;

    /// Takes one unit of capacity.
    ///
    /// Decrements `available` iff it is greater than zero and returns the
    /// updated slot. Fails with `SlotUnavailable` when the slot is exhausted.
    async fn try_reserve(&self, id: SlotId) -> Result<Slot>;

    /// Gives back one unit of capacity.
    ///
    /// Increments `available` iff it is below `capacity`. Fails with
    /// `OverRelease` when the slot is already full, leaving it untouched.
    async fn release(&self, id: SlotId) -> Result<Slot>;

    /// Gives back one unit of capacity at most once per `key`.
    ///
    /// The key is recorded in the same atomic step as the increment, so a
    /// retry after an ambiguous failure can never release twice. Repeating
    /// an already applied key returns the current slot unchanged.
    async fn release_once(&self, id: SlotId, key: CompensationId) -> Result<Slot>;

    /// Lists slots of a service that still have capacity and start within
    /// `[from, to]`, ordered by start time.
    async fn find_available(
        &self,
        service_id: ServiceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>>;
}

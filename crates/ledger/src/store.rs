use async_trait::async_trait;

use crate::{
    Booking, BookingId, BookingStatus, LedgerError, NewBooking, PatientId, Result, SlotId,
};

/// Core trait for booking ledger implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Records a new `Pending` booking.
    ///
    /// Only called after the booking's slot capacity was reserved.
    async fn create(&self, new: NewBooking) -> Result<Booking>;

    /// Loads a booking by id.
    async fn get(&self, id: BookingId) -> Result<Booking>;

    /// Lists a patient's bookings, most recent first.
    async fn find_by_patient(&self, patient_id: PatientId) -> Result<Vec<Booking>>;

    /// Lists the active (pending or confirmed) bookings of a slot.
    async fn find_active_by_slot(&self, slot_id: SlotId) -> Result<Vec<Booking>>;

    /// Moves a booking from `from` to `to` as a single compare-and-set.
    ///
    /// Fails with `InvalidTransition` if the state machine forbids the move and
    /// with `StatusMismatch` if the stored status is not `from`.
    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking>;
}

/// Rejects transitions the state machine does not allow.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition { from, to })
    }
}

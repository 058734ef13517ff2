//! Shared application state.

use booking::BookingService;
use ledger::BookingLedger;
use reservation::CompensationJournal;
use slot_store::SlotStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    pub bookings: BookingService<S, L, J>,
}

impl<S, L, J> AppState<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    pub fn new(bookings: BookingService<S, L, J>) -> Self {
        Self { bookings }
    }
}

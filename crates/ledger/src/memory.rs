use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::store::{BookingLedger, check_transition};
use crate::{
    Booking, BookingId, BookingStatus, LedgerError, NewBooking, PatientId, Result, SlotId,
};

#[derive(Debug, Default)]
struct LedgerState {
    /// Bookings with their insertion sequence, used to order ties on `created_at`.
    bookings: HashMap<BookingId, (u64, Booking)>,
    next_seq: u64,
}

/// In-memory booking ledger.
#[derive(Clone, Default)]
pub struct InMemoryBookingLedger {
    state: Arc<RwLock<LedgerState>>,
    fail_on_create: Arc<AtomicBool>,
    fail_on_transition: Arc<AtomicBool>,
}

impl InMemoryBookingLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the ledger to fail every create call with a backend error.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Configures the ledger to fail every transition with a backend error.
    pub fn set_fail_on_transition(&self, fail: bool) {
        self.fail_on_transition.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of bookings recorded.
    pub async fn booking_count(&self) -> usize {
        self.state.read().await.bookings.len()
    }
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn create(&self, new: NewBooking) -> Result<Booking> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("injected create failure".to_string()));
        }

        let booking = Booking::pending(new);
        let mut state = self.state.write().await;
        if state.bookings.contains_key(&booking.id) {
            return Err(LedgerError::DuplicateBooking(booking.id));
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.bookings.insert(booking.id, (seq, booking.clone()));
        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Booking> {
        self.state
            .read()
            .await
            .bookings
            .get(&id)
            .map(|(_, booking)| booking.clone())
            .ok_or(LedgerError::BookingNotFound(id))
    }

    async fn find_by_patient(&self, patient_id: PatientId) -> Result<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<_> = state
            .bookings
            .values()
            .filter(|(_, b)| b.patient_id == patient_id)
            .cloned()
            .collect();
        bookings.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(bookings.into_iter().map(|(_, b)| b).collect())
    }

    async fn find_active_by_slot(&self, slot_id: SlotId) -> Result<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<_> = state
            .bookings
            .values()
            .filter(|(_, b)| b.slot_id == slot_id && b.is_active())
            .cloned()
            .collect();
        bookings.sort_by_key(|(seq, _)| *seq);
        Ok(bookings.into_iter().map(|(_, b)| b).collect())
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking> {
        check_transition(from, to)?;
        if self.fail_on_transition.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend(
                "injected transition failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let (_, booking) = state
            .bookings
            .get_mut(&id)
            .ok_or(LedgerError::BookingNotFound(id))?;

        if booking.status != from {
            tracing::debug!(
                booking_id = %id,
                expected = %from,
                actual = %booking.status,
                "booking status changed concurrently"
            );
            return Err(LedgerError::StatusMismatch {
                booking_id: id,
                expected: from,
                actual: booking.status,
            });
        }

        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClinicId, ServiceId};

    fn new_booking(patient_id: PatientId, slot_id: SlotId) -> NewBooking {
        NewBooking::new(patient_id, ClinicId::new(), ServiceId::new(), slot_id, "")
    }

    #[tokio::test]
    async fn create_and_get() {
        let ledger = InMemoryBookingLedger::new();
        let created = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        assert_eq!(created.status, BookingStatus::Pending);
        assert_eq!(ledger.get(created.id).await.unwrap(), created);
        assert_eq!(ledger.booking_count().await, 1);
    }

    #[tokio::test]
    async fn missing_booking_is_not_found() {
        let ledger = InMemoryBookingLedger::new();
        let result = ledger.get(BookingId::new()).await;
        assert!(matches!(result, Err(LedgerError::BookingNotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let ledger = InMemoryBookingLedger::new();
        let id = BookingId::new();
        let mut first = new_booking(PatientId::new(), SlotId::new());
        first.id = Some(id);
        ledger.create(first.clone()).await.unwrap();

        let result = ledger.create(first).await;
        assert!(matches!(result, Err(LedgerError::DuplicateBooking(dup)) if dup == id));
    }

    #[tokio::test]
    async fn failing_create_records_nothing() {
        let ledger = InMemoryBookingLedger::new();
        ledger.set_fail_on_create(true);

        let err = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.booking_count().await, 0);
    }

    #[tokio::test]
    async fn failing_transition_leaves_status() {
        let ledger = InMemoryBookingLedger::new();
        let booking = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();
        ledger.set_fail_on_transition(true);

        let err = ledger
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            ledger.get(booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
    }

    #[tokio::test]
    async fn find_by_patient_is_most_recent_first() {
        let ledger = InMemoryBookingLedger::new();
        let patient_id = PatientId::new();

        let first = ledger
            .create(new_booking(patient_id, SlotId::new()))
            .await
            .unwrap();
        let second = ledger
            .create(new_booking(patient_id, SlotId::new()))
            .await
            .unwrap();
        let third = ledger
            .create(new_booking(patient_id, SlotId::new()))
            .await
            .unwrap();
        ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        let ids: Vec<_> = ledger
            .find_by_patient(patient_id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn find_active_by_slot_skips_terminal_bookings() {
        let ledger = InMemoryBookingLedger::new();
        let slot_id = SlotId::new();

        let active = ledger
            .create(new_booking(PatientId::new(), slot_id))
            .await
            .unwrap();
        let cancelled = ledger
            .create(new_booking(PatientId::new(), slot_id))
            .await
            .unwrap();
        ledger
            .transition(cancelled.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap();
        ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        let found = ledger.find_active_by_slot(slot_id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, active.id);
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let ledger = InMemoryBookingLedger::new();
        let booking = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        let confirmed = ledger
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let result = ledger
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::StatusMismatch {
                expected: BookingStatus::Pending,
                actual: BookingStatus::Confirmed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn forbidden_transition_is_rejected() {
        let ledger = InMemoryBookingLedger::new();
        let booking = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        let result = ledger
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Completed)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
        assert_eq!(
            ledger.get(booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancels_succeed_once() {
        let ledger = InMemoryBookingLedger::new();
        let booking = ledger
            .create(new_booking(PatientId::new(), SlotId::new()))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
                        .await
                })
            })
            .collect();

        let succeeded = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(succeeded, 1);
    }
}

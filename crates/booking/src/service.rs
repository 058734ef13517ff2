use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BookingId, ClinicId, ServiceId, SlotId};
use ledger::{Booking, BookingLedger};
use reservation::{
    BookingDetails, CompensationJournal, CompensationReport, CreateBooking, ReservationEngine,
    ReservationError, Result,
};
use serde::{Deserialize, Serialize};
use slot_store::{Slot, SlotStore};

use crate::caller::CallerIdentity;

/// Request body for creating a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub clinic_id: ClinicId,
    pub service_id: ServiceId,
    pub slot_id: SlotId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Public facade over the reservation engine.
pub struct BookingService<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    engine: Arc<ReservationEngine<S, L, J>>,
}

impl<S, L, J> Clone for BookingService<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S, L, J> BookingService<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    pub fn new(engine: ReservationEngine<S, L, J>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &ReservationEngine<S, L, J> {
        &self.engine
    }

    /// Books one unit of a slot for the caller.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.subject()))]
    pub async fn create_booking(
        &self,
        caller: &dyn CallerIdentity,
        request: CreateBookingRequest,
    ) -> Result<BookingDetails> {
        self.engine
            .create_booking(CreateBooking {
                user_id: caller.subject(),
                clinic_id: request.clinic_id,
                service_id: request.service_id,
                slot_id: request.slot_id,
                notes: request.notes.unwrap_or_default(),
            })
            .await
    }

    /// Cancels one of the caller's bookings.
    ///
    /// A caller without a patient record cannot own bookings, so this is
    /// reported as the booking not being found.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.subject()))]
    pub async fn cancel_booking(
        &self,
        caller: &dyn CallerIdentity,
        booking_id: BookingId,
    ) -> Result<Booking> {
        let patient = match self.engine.resolve_patient(caller.subject()).await {
            Ok(patient) => patient,
            Err(ReservationError::PatientNotFound(_)) => {
                return Err(ReservationError::BookingNotFound(booking_id));
            }
            Err(err) => return Err(err),
        };
        self.engine.cancel_booking(booking_id, patient.id).await
    }

    /// The caller's bookings, most recent first. Empty for callers without
    /// a patient record.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.subject()))]
    pub async fn list_bookings(&self, caller: &dyn CallerIdentity) -> Result<Vec<BookingDetails>> {
        match self.engine.resolve_patient(caller.subject()).await {
            Ok(patient) => self.engine.list_bookings(patient.id).await,
            Err(ReservationError::PatientNotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn get_slot(&self, slot_id: SlotId) -> Result<Slot> {
        self.engine.get_slot(slot_id).await
    }

    pub async fn available_slots(
        &self,
        service_id: ServiceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        self.engine.available_slots(service_id, from, to).await
    }

    /// Re-runs compensations left open by a crash or an escalation.
    pub async fn resume_pending_compensations(&self) -> Result<CompensationReport> {
        self.engine.resume_pending_compensations().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::UserId;
    use ledger::{BookingStatus, InMemoryBookingLedger};
    use reservation::{InMemoryCompensationJournal, InMemoryDirectory, Patient};
    use slot_store::{InMemorySlotStore, NewSlot};

    type TestService =
        BookingService<InMemorySlotStore, InMemoryBookingLedger, InMemoryCompensationJournal>;

    struct Setup {
        service: TestService,
        directory: InMemoryDirectory,
        slots: InMemorySlotStore,
        clinic_id: ClinicId,
        service_id: ServiceId,
    }

    fn setup() -> Setup {
        let directory = InMemoryDirectory::new();
        let slots = InMemorySlotStore::new();
        let engine = ReservationEngine::new(
            slots.clone(),
            InMemoryBookingLedger::new(),
            InMemoryCompensationJournal::new(),
            Arc::new(directory.clone()),
            Arc::new(directory.clone()),
        );
        Setup {
            service: BookingService::new(engine),
            directory,
            slots,
            clinic_id: ClinicId::new(),
            service_id: ServiceId::new(),
        }
    }

    impl Setup {
        async fn slot(&self) -> SlotId {
            let start = Utc::now() + Duration::hours(2);
            self.slots
                .create_slot(NewSlot::new(
                    self.service_id,
                    self.clinic_id,
                    start,
                    start + Duration::minutes(30),
                    1,
                ))
                .await
                .unwrap()
                .id
        }

        async fn patient(&self) -> UserId {
            let user_id = UserId::new();
            self.directory
                .add_patient(Patient::new(user_id, "Patient"))
                .await;
            user_id
        }

        fn request(&self, slot_id: SlotId) -> CreateBookingRequest {
            CreateBookingRequest {
                clinic_id: self.clinic_id,
                service_id: self.service_id,
                slot_id,
                notes: None,
            }
        }
    }

    #[tokio::test]
    async fn create_list_and_cancel_for_caller() {
        let s = setup();
        let slot_id = s.slot().await;
        let caller = s.patient().await;

        let details = s
            .service
            .create_booking(&caller, s.request(slot_id))
            .await
            .unwrap();
        assert_eq!(details.booking.notes, "");

        let listed = s.service.list_bookings(&caller).await.unwrap();
        assert_eq!(listed.len(), 1);

        let cancelled = s
            .service
            .cancel_booking(&caller, details.booking.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(s.service.get_slot(slot_id).await.unwrap().available, 1);
    }

    #[tokio::test]
    async fn caller_without_patient_record() {
        let s = setup();
        let slot_id = s.slot().await;
        let stranger = UserId::new();

        let created = s.service.create_booking(&stranger, s.request(slot_id)).await;
        assert!(matches!(created, Err(ReservationError::PatientNotFound(_))));

        assert!(s.service.list_bookings(&stranger).await.unwrap().is_empty());

        let booking_id = BookingId::new();
        let cancelled = s.service.cancel_booking(&stranger, booking_id).await;
        assert!(matches!(
            cancelled,
            Err(ReservationError::BookingNotFound(id)) if id == booking_id
        ));
    }

    #[tokio::test]
    async fn bookings_are_private_to_their_owner() {
        let s = setup();
        let slot_id = s.slot().await;
        let owner = s.patient().await;
        let other = s.patient().await;

        let details = s
            .service
            .create_booking(&owner, s.request(slot_id))
            .await
            .unwrap();

        assert!(s.service.list_bookings(&other).await.unwrap().is_empty());
        let result = s.service.cancel_booking(&other, details.booking.id).await;
        assert!(matches!(result, Err(ReservationError::BookingNotFound(_))));
    }

    #[test]
    fn request_notes_are_optional() {
        let json = serde_json::json!({
            "clinic_id": ClinicId::new(),
            "service_id": ServiceId::new(),
            "slot_id": SlotId::new(),
        });
        let request: CreateBookingRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.notes, None);
    }
}

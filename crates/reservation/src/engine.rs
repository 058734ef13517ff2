//! Reservation engine: ties slot capacity to the booking lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{BookingId, ClinicId, PatientId, RetryPolicy, ServiceId, SlotId, UserId};
use ledger::{Booking, BookingLedger, BookingStatus, LedgerError, NewBooking};
use slot_store::{Slot, SlotStore, SlotStoreError};

use crate::details::{BookingDetails, CompensationReport, SlotAccounting, SlotSummary};
use crate::directory::{Catalog, Clinic, Patient, PatientDirectory, Service};
use crate::error::{ReservationError, Result};
use crate::journal::{
    CompensationJournal, CompensationKind, CompensationOutcome, CompensationRecord,
    NewCompensation,
};
use crate::state::CompensationState;
use crate::telemetry;

/// Longest accepted booking note, in characters.
pub const MAX_NOTES_LEN: usize = 1000;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backoff for capacity releases and the lookups that guard them.
    pub retry: RetryPolicy,
    pub max_notes_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_notes_len: MAX_NOTES_LEN,
        }
    }
}

/// A booking request for an already resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBooking {
    pub user_id: UserId,
    pub clinic_id: ClinicId,
    pub service_id: ServiceId,
    pub slot_id: SlotId,
    pub notes: String,
}

/// Orchestrates capacity changes tied to booking transitions.
///
/// Slot store and ledger are separate stores with no shared transaction, so
/// every path that reserves capacity ends either in a recorded booking or in
/// a journaled release. Releases go through `SlotStore::release_once` keyed
/// by `CompensationRecord::release_key` and are retried with the configured
/// backoff.
pub struct ReservationEngine<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    slots: S,
    ledger: L,
    journal: J,
    patients: Arc<dyn PatientDirectory>,
    catalog: Arc<dyn Catalog>,
    config: EngineConfig,
}

impl<S, L, J> ReservationEngine<S, L, J>
where
    S: SlotStore,
    L: BookingLedger,
    J: CompensationJournal,
{
    /// Creates a new engine with the default configuration.
    pub fn new(
        slots: S,
        ledger: L,
        journal: J,
        patients: Arc<dyn PatientDirectory>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            slots,
            ledger,
            journal,
            patients,
            catalog,
            config: EngineConfig::default(),
        }
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn slots(&self) -> &S {
        &self.slots
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Maps a user to their patient record.
    pub async fn resolve_patient(&self, user_id: UserId) -> Result<Patient> {
        Ok(self.patients.resolve_patient(user_id).await?)
    }

    /// Reserves one unit of the slot and records a `Pending` booking.
    ///
    /// Capacity is only touched after the patient and the slot have been
    /// validated. If the booking cannot be recorded the reservation is
    /// released again and the ledger error is returned.
    #[tracing::instrument(skip(self, request), fields(slot_id = %request.slot_id, user_id = %request.user_id))]
    pub async fn create_booking(&self, request: CreateBooking) -> Result<BookingDetails> {
        let started = Instant::now();

        self.validate_notes(&request.notes)?;
        let patient = self.patients.resolve_patient(request.user_id).await?;

        let slot = self.slots.get_slot(request.slot_id).await?;
        if slot.service_id != request.service_id {
            return Err(ReservationError::SlotMismatch {
                slot_id: slot.id,
                field: "service",
            });
        }
        if slot.clinic_id != request.clinic_id {
            return Err(ReservationError::SlotMismatch {
                slot_id: slot.id,
                field: "clinic",
            });
        }

        let reserved = match self.slots.try_reserve(slot.id).await {
            Ok(reserved) => reserved,
            Err(SlotStoreError::SlotUnavailable(slot_id)) => {
                telemetry::booking_conflict(slot_id, "slot_unavailable");
                return Err(ReservationError::SlotUnavailable(slot_id));
            }
            Err(err) => return Err(err.into()),
        };

        let booking_id = BookingId::new();
        let new = NewBooking::new(
            patient.id,
            request.clinic_id,
            request.service_id,
            slot.id,
            request.notes,
        )
        .with_id(booking_id);

        match self.ledger.create(new).await {
            Ok(booking) => {
                telemetry::booking_created(&booking, started.elapsed());
                Ok(self.project(booking, &reserved).await)
            }
            Err(err) => {
                telemetry::ledger_write_failed(slot.id, &err);
                let compensation = NewCompensation::release_after_ledger_failure(slot.id, booking_id);
                match self.compensate(compensation).await? {
                    // The write took effect despite the error.
                    CompensationState::Skipped => {
                        let booking = self.ledger.get(booking_id).await?;
                        telemetry::booking_created(&booking, started.elapsed());
                        Ok(self.project(booking, &reserved).await)
                    }
                    _ => Err(err.into()),
                }
            }
        }
    }

    /// Cancels a booking owned by `patient_id` and gives its capacity back.
    ///
    /// A booking owned by someone else is reported as not found. The release
    /// is journaled before the status change, so a cancelled booking always
    /// has an entry that `resume_pending_compensations` can finish. If the
    /// journal cannot be written the booking is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        patient_id: PatientId,
    ) -> Result<Booking> {
        // Statuses only move forward, so a lost race is retried at most once
        // per intermediate status.
        let (cancelled, record) = loop {
            let booking = self.ledger.get(booking_id).await?;
            if booking.patient_id != patient_id {
                return Err(ReservationError::BookingNotFound(booking_id));
            }

            match booking.status {
                BookingStatus::Cancelled => {
                    telemetry::booking_conflict(booking.slot_id, "already_cancelled");
                    return Err(ReservationError::AlreadyCancelled(booking_id));
                }
                BookingStatus::Completed => {
                    return Err(ReservationError::InvalidTransition {
                        booking_id,
                        from: BookingStatus::Completed,
                        to: BookingStatus::Cancelled,
                    });
                }
                BookingStatus::Pending | BookingStatus::Confirmed => {}
            }

            let new = NewCompensation::release_after_cancellation(booking.slot_id, booking.id);
            let record = match self.journal.record(new.clone()).await {
                Ok(record) => record,
                Err(err) => {
                    telemetry::cancellation_not_journaled(&new, &err);
                    return Err(err.into());
                }
            };

            match self
                .ledger
                .transition(booking_id, booking.status, BookingStatus::Cancelled)
                .await
            {
                Ok(cancelled) => break (cancelled, record),
                Err(LedgerError::StatusMismatch { .. }) => {
                    // Whoever changed the status owns the release.
                    let reason = "booking status changed concurrently";
                    telemetry::compensation_skipped(&record, reason);
                    self.settle(&record, &CompensationOutcome::skipped(reason))
                        .await;
                    continue;
                }
                // The entry stays `Pending`; resuming it reads the ledger to
                // decide whether the cancellation landed.
                Err(err) => return Err(err.into()),
            }
        };

        telemetry::booking_cancelled(&cancelled);
        self.finish_compensation(&record, true).await?;

        Ok(cancelled)
    }

    /// Provider confirmation. Moves the ledger state only.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.advance(booking_id, BookingStatus::Confirmed).await
    }

    /// Marks a confirmed appointment as held. Moves the ledger state only.
    #[tracing::instrument(skip(self))]
    pub async fn complete_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.advance(booking_id, BookingStatus::Completed).await
    }

    /// A patient's bookings, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn list_bookings(&self, patient_id: PatientId) -> Result<Vec<BookingDetails>> {
        let bookings = self.ledger.find_by_patient(patient_id).await?;

        let mut slots: HashMap<SlotId, Slot> = HashMap::new();
        let mut clinics: HashMap<ClinicId, Option<Clinic>> = HashMap::new();
        let mut services: HashMap<ServiceId, Option<Service>> = HashMap::new();

        let mut details = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if !slots.contains_key(&booking.slot_id) {
                let slot = self.slots.get_slot(booking.slot_id).await?;
                slots.insert(slot.id, slot);
            }
            if !clinics.contains_key(&booking.clinic_id) {
                let clinic = self.lookup_clinic(booking.clinic_id).await;
                clinics.insert(booking.clinic_id, clinic);
            }
            if !services.contains_key(&booking.service_id) {
                let service = self.lookup_service(booking.service_id).await;
                services.insert(booking.service_id, service);
            }

            let Some(slot) = slots.get(&booking.slot_id) else {
                continue;
            };
            details.push(BookingDetails {
                slot: SlotSummary::from(slot),
                clinic: clinics.get(&booking.clinic_id).cloned().flatten(),
                service: services.get(&booking.service_id).cloned().flatten(),
                booking,
            });
        }

        Ok(details)
    }

    pub async fn get_slot(&self, slot_id: SlotId) -> Result<Slot> {
        Ok(self.slots.get_slot(slot_id).await?)
    }

    /// Bookable slots of a service starting within `[from, to]`.
    pub async fn available_slots(
        &self,
        service_id: ServiceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        if from > to {
            return Err(ReservationError::Validation(
                "`from` must not be after `to`".to_string(),
            ));
        }
        Ok(self.slots.find_available(service_id, from, to).await?)
    }

    /// Re-runs every `Pending` or `Escalated` journal entry, oldest first.
    ///
    /// Meant for startup after a crash and for operators after an
    /// escalation. Settled entries are never touched again.
    #[tracing::instrument(skip(self))]
    pub async fn resume_pending_compensations(&self) -> Result<CompensationReport> {
        let open = self.journal.open_entries().await?;

        let mut report = CompensationReport::default();
        for record in open {
            let outcome = self.run_compensation(&record).await;
            self.settle(&record, &outcome).await;
            match outcome.state {
                CompensationState::Applied => report.applied += 1,
                CompensationState::Skipped => report.skipped += 1,
                CompensationState::Escalated | CompensationState::Pending => {
                    report.escalated += 1
                }
            }
        }

        tracing::info!(
            applied = report.applied,
            skipped = report.skipped,
            escalated = report.escalated,
            "compensation journal resumed"
        );
        Ok(report)
    }

    /// Capacity bookkeeping of a slot, for consistency checks.
    pub async fn slot_accounting(&self, slot_id: SlotId) -> Result<SlotAccounting> {
        let slot = self.slots.get_slot(slot_id).await?;
        let active = self.ledger.find_active_by_slot(slot_id).await?.len();
        let open = self.journal.open_entries_for_slot(slot_id).await?.len();

        Ok(SlotAccounting {
            capacity: slot.capacity,
            available: slot.available,
            active_bookings: u32::try_from(active).unwrap_or(u32::MAX),
            open_compensations: u32::try_from(open).unwrap_or(u32::MAX),
        })
    }

    fn validate_notes(&self, notes: &str) -> Result<()> {
        if notes.chars().count() > self.config.max_notes_len {
            return Err(ReservationError::Validation(format!(
                "notes must be at most {} characters",
                self.config.max_notes_len
            )));
        }
        Ok(())
    }

    async fn advance(&self, booking_id: BookingId, to: BookingStatus) -> Result<Booking> {
        let booking = self.ledger.get(booking_id).await?;
        if !booking.status.can_transition_to(to) {
            return Err(match booking.status {
                BookingStatus::Cancelled => ReservationError::AlreadyCancelled(booking_id),
                from => ReservationError::InvalidTransition {
                    booking_id,
                    from,
                    to,
                },
            });
        }

        self.ledger
            .transition(booking_id, booking.status, to)
            .await
            .map_err(|err| match err {
                LedgerError::StatusMismatch {
                    actual: BookingStatus::Cancelled,
                    ..
                } => ReservationError::AlreadyCancelled(booking_id),
                LedgerError::StatusMismatch { actual, .. } => ReservationError::InvalidTransition {
                    booking_id,
                    from: actual,
                    to,
                },
                other => other.into(),
            })
    }

    /// Journals and runs the release of a reservation whose booking could not
    /// be recorded.
    ///
    /// Returns the settled state (`Applied` or `Skipped`), or `Inconsistency`
    /// when the release escalated.
    async fn compensate(&self, new: NewCompensation) -> Result<CompensationState> {
        let (record, journaled) = match self.journal.record(new.clone()).await {
            Ok(record) => (record, true),
            Err(err) => {
                // Without an entry the release cannot be resumed later, but a
                // keyed release is still safe to attempt now.
                telemetry::journal_record_failed(&new, &err);
                (CompensationRecord::pending(new), false)
            }
        };

        self.finish_compensation(&record, journaled).await
    }

    /// Runs an entry and settles it in the journal when it was recorded.
    async fn finish_compensation(
        &self,
        record: &CompensationRecord,
        journaled: bool,
    ) -> Result<CompensationState> {
        let outcome = self.run_compensation(record).await;
        if journaled {
            self.settle(record, &outcome).await;
        }

        match outcome.state {
            CompensationState::Applied | CompensationState::Skipped => Ok(outcome.state),
            CompensationState::Escalated | CompensationState::Pending => {
                Err(ReservationError::Inconsistency {
                    compensation_id: record.id,
                    slot_id: record.slot_id,
                    reason: outcome.last_error.unwrap_or_default(),
                })
            }
        }
    }

    /// Runs one compensation to a settled or escalated outcome.
    async fn run_compensation(&self, record: &CompensationRecord) -> CompensationOutcome {
        let owed = match self.capacity_still_owed(record).await {
            Ok(owed) => owed,
            Err(err) => {
                let error = format!("could not read booking {}: {err}", record.booking_id);
                telemetry::compensation_escalated(record, 0, &error);
                return CompensationOutcome::escalated(0, error);
            }
        };
        if let Err(reason) = owed {
            telemetry::compensation_skipped(record, &reason);
            return CompensationOutcome::skipped(reason);
        }

        let mut attempts: u32 = 0;
        let released = self
            .config
            .retry
            .retry_if(
                |attempt| {
                    attempts += 1;
                    if attempt > 0 {
                        telemetry::compensation_retry(record, attempt);
                    }
                    self.slots.release_once(record.slot_id, record.release_key())
                },
                SlotStoreError::is_transient,
            )
            .await;

        match released {
            Ok(_) => {
                telemetry::compensation_applied(record);
                CompensationOutcome::applied(attempts)
            }
            Err(err) => {
                let error = err.to_string();
                telemetry::compensation_escalated(record, attempts, &error);
                CompensationOutcome::escalated(attempts, error)
            }
        }
    }

    /// Checks the ledger before giving capacity back.
    ///
    /// The inner `Err` carries the reason the release must not happen: the
    /// booking was recorded after all, or is no longer cancelled.
    async fn capacity_still_owed(
        &self,
        record: &CompensationRecord,
    ) -> std::result::Result<std::result::Result<(), String>, LedgerError> {
        let lookup = self
            .config
            .retry
            .retry_if(|_| self.ledger.get(record.booking_id), LedgerError::is_transient)
            .await;

        let owed = match (record.kind, lookup) {
            (CompensationKind::ReleaseAfterLedgerFailure, Err(LedgerError::BookingNotFound(_))) => {
                Ok(())
            }
            (CompensationKind::ReleaseAfterLedgerFailure, Ok(_)) => Err(format!(
                "booking {} was recorded",
                record.booking_id
            )),
            (CompensationKind::ReleaseAfterCancellation, Ok(booking))
                if booking.status == BookingStatus::Cancelled =>
            {
                Ok(())
            }
            (CompensationKind::ReleaseAfterCancellation, Ok(booking)) => Err(format!(
                "booking {} is {}, not cancelled",
                booking.id, booking.status
            )),
            (CompensationKind::ReleaseAfterCancellation, Err(LedgerError::BookingNotFound(_))) => {
                Err(format!("booking {} no longer exists", record.booking_id))
            }
            (_, Err(err)) => return Err(err),
        };
        Ok(owed)
    }

    async fn settle(&self, record: &CompensationRecord, outcome: &CompensationOutcome) {
        if let Err(err) = self.journal.update(record.id, outcome.clone()).await {
            telemetry::journal_update_failed(record, &err);
        }
    }

    async fn project(&self, booking: Booking, slot: &Slot) -> BookingDetails {
        let clinic = self.lookup_clinic(booking.clinic_id).await;
        let service = self.lookup_service(booking.service_id).await;
        BookingDetails {
            slot: SlotSummary::from(slot),
            clinic,
            service,
            booking,
        }
    }

    /// Catalog lookups only enrich projections; a failure leaves the field
    /// empty instead of failing the booking.
    async fn lookup_clinic(&self, clinic_id: ClinicId) -> Option<Clinic> {
        match self.catalog.clinic(clinic_id).await {
            Ok(clinic) => clinic,
            Err(err) => {
                tracing::warn!(%clinic_id, error = %err, "catalog lookup failed");
                None
            }
        }
    }

    async fn lookup_service(&self, service_id: ServiceId) -> Option<Service> {
        match self.catalog.service(service_id).await {
            Ok(service) => service,
            Err(err) => {
                tracing::warn!(%service_id, error = %err, "catalog lookup failed");
                None
            }
        }
    }
}

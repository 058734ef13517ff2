//! Logs and metrics emitted by the reservation engine.
//!
//! Metric names:
//! - `bookings_created_total`
//! - `booking_conflicts_total` (label `reason`)
//! - `bookings_cancelled_total`
//! - `compensations_applied_total` (label `kind`)
//! - `compensations_skipped_total` (label `kind`)
//! - `compensation_retries_total` (label `kind`)
//! - `capacity_ledger_divergence_total` (label `kind`)
//! - `booking_create_duration_seconds`

use std::time::Duration;

use ledger::Booking;
use slot_store::SlotId;

use crate::journal::{CompensationRecord, NewCompensation};

pub(crate) fn booking_created(booking: &Booking, elapsed: Duration) {
    metrics::counter!("bookings_created_total").increment(1);
    metrics::histogram!("booking_create_duration_seconds").record(elapsed.as_secs_f64());
    tracing::info!(
        booking_id = %booking.id,
        slot_id = %booking.slot_id,
        patient_id = %booking.patient_id,
        "booking created"
    );
}

pub(crate) fn booking_conflict(slot_id: SlotId, reason: &'static str) {
    metrics::counter!("booking_conflicts_total", "reason" => reason).increment(1);
    tracing::info!(%slot_id, reason, "booking rejected");
}

pub(crate) fn booking_cancelled(booking: &Booking) {
    metrics::counter!("bookings_cancelled_total").increment(1);
    tracing::info!(booking_id = %booking.id, slot_id = %booking.slot_id, "booking cancelled");
}

pub(crate) fn ledger_write_failed(slot_id: SlotId, error: &dyn std::fmt::Display) {
    tracing::warn!(%slot_id, %error, "ledger write failed after reserving; compensating");
}

pub(crate) fn journal_record_failed(new: &NewCompensation, error: &dyn std::fmt::Display) {
    tracing::error!(
        slot_id = %new.slot_id,
        booking_id = %new.booking_id,
        kind = %new.kind,
        %error,
        "could not journal compensation; releasing without a record"
    );
}

pub(crate) fn cancellation_not_journaled(new: &NewCompensation, error: &dyn std::fmt::Display) {
    tracing::error!(
        slot_id = %new.slot_id,
        booking_id = %new.booking_id,
        %error,
        "could not journal release; booking left uncancelled"
    );
}

pub(crate) fn compensation_retry(record: &CompensationRecord, attempt: usize) {
    metrics::counter!("compensation_retries_total", "kind" => record.kind.as_str()).increment(1);
    tracing::debug!(
        compensation_id = %record.id,
        slot_id = %record.slot_id,
        attempt,
        "retrying capacity release"
    );
}

pub(crate) fn compensation_applied(record: &CompensationRecord) {
    metrics::counter!("compensations_applied_total", "kind" => record.kind.as_str()).increment(1);
    tracing::info!(
        compensation_id = %record.id,
        slot_id = %record.slot_id,
        kind = %record.kind,
        "capacity released"
    );
}

pub(crate) fn compensation_skipped(record: &CompensationRecord, reason: &str) {
    metrics::counter!("compensations_skipped_total", "kind" => record.kind.as_str()).increment(1);
    tracing::warn!(
        compensation_id = %record.id,
        slot_id = %record.slot_id,
        booking_id = %record.booking_id,
        reason,
        "compensation skipped"
    );
}

pub(crate) fn compensation_escalated(record: &CompensationRecord, attempts: u32, error: &str) {
    metrics::counter!("capacity_ledger_divergence_total", "kind" => record.kind.as_str())
        .increment(1);
    tracing::error!(
        compensation_id = %record.id,
        slot_id = %record.slot_id,
        booking_id = %record.booking_id,
        kind = %record.kind,
        attempts,
        error,
        "capacity release escalated; slot capacity and ledger diverge"
    );
}

pub(crate) fn journal_update_failed(record: &CompensationRecord, error: &dyn std::fmt::Display) {
    tracing::warn!(
        compensation_id = %record.id,
        %error,
        "could not settle journal entry; it will be re-run on resume"
    );
}

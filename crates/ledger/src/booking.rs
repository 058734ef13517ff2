use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingId, BookingStatus, ClinicId, PatientId, ServiceId, SlotId};

/// A patient's claim on one unit of a slot's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub patient_id: PatientId,
    pub clinic_id: ClinicId,
    pub service_id: ServiceId,
    pub slot_id: SlotId,
    pub status: BookingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    /// Time of the last status transition.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Builds a fresh `Pending` booking.
    pub fn pending(new: NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id: new.id.unwrap_or_default(),
            patient_id: new.patient_id,
            clinic_id: new.clinic_id,
            service_id: new.service_id,
            slot_id: new.slot_id,
            status: BookingStatus::Pending,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the booking still holds slot capacity.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A booking to be recorded after its slot capacity was reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    /// Explicit id; a random one is assigned when absent.
    pub id: Option<BookingId>,
    pub patient_id: PatientId,
    pub clinic_id: ClinicId,
    pub service_id: ServiceId,
    pub slot_id: SlotId,
    pub notes: String,
}

impl NewBooking {
    pub fn new(
        patient_id: PatientId,
        clinic_id: ClinicId,
        service_id: ServiceId,
        slot_id: SlotId,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            patient_id,
            clinic_id,
            service_id,
            slot_id,
            notes: notes.into(),
        }
    }

    /// Pins the booking id, so the caller can look the booking up even when
    /// the create call reports a failure.
    pub fn with_id(mut self, id: BookingId) -> Self {
        self.id = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_booking_starts_active() {
        let booking = Booking::pending(NewBooking::new(
            PatientId::new(),
            ClinicId::new(),
            ServiceId::new(),
            SlotId::new(),
            "first visit",
        ));

        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.is_active());
        assert_eq!(booking.notes, "first visit");
        assert_eq!(booking.created_at, booking.updated_at);
    }
}

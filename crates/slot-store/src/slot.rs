use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClinicId, Result, ServiceId, SlotId, SlotStoreError};

/// A bookable time window offered by a clinic for one of its services.
///
/// `available` is the remaining unreserved capacity. The store guarantees
/// `0 <= available <= capacity`; `capacity` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub service_id: ServiceId,
    pub clinic_id: ClinicId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub available: u32,
}

impl Slot {
    /// Builds a fresh slot with all of its capacity available.
    pub fn from_new(new: NewSlot) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            id: new.id.unwrap_or_default(),
            service_id: new.service_id,
            clinic_id: new.clinic_id,
            start_time: new.start_time,
            end_time: new.end_time,
            capacity: new.capacity,
            available: new.capacity,
        })
    }

    /// Returns true if at least one unit of capacity is unreserved.
    pub fn is_available(&self) -> bool {
        self.available > 0
    }

    /// Number of units currently held by active bookings.
    pub fn reserved(&self) -> u32 {
        self.capacity - self.available
    }
}

/// Definition of a slot to be created by the scheduling workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    /// Explicit id; a random one is assigned when absent.
    pub id: Option<SlotId>,
    pub service_id: ServiceId,
    pub clinic_id: ClinicId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
}

impl NewSlot {
    pub fn new(
        service_id: ServiceId,
        clinic_id: ClinicId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        capacity: u32,
    ) -> Self {
        Self {
            id: None,
            service_id,
            clinic_id,
            start_time,
            end_time,
            capacity,
        }
    }

    /// Sets an explicit slot id.
    pub fn with_id(mut self, id: SlotId) -> Self {
        self.id = Some(id);
        self
    }

    /// Checks the window and capacity.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SlotStoreError::InvalidSlot(
                "capacity must be at least 1".to_string(),
            ));
        }
        if i32::try_from(self.capacity).is_err() {
            return Err(SlotStoreError::InvalidSlot(format!(
                "capacity {} is too large",
                self.capacity
            )));
        }
        if self.end_time <= self.start_time {
            return Err(SlotStoreError::InvalidSlot(
                "end_time must be after start_time".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_slot(capacity: u32) -> NewSlot {
        let start = Utc::now();
        NewSlot::new(
            ServiceId::new(),
            ClinicId::new(),
            start,
            start + Duration::minutes(30),
            capacity,
        )
    }

    #[test]
    fn fresh_slot_is_fully_available() {
        let slot = Slot::from_new(new_slot(3)).unwrap();
        assert_eq!(slot.capacity, 3);
        assert_eq!(slot.available, 3);
        assert_eq!(slot.reserved(), 0);
        assert!(slot.is_available());
    }

    #[test]
    fn explicit_id_is_kept() {
        let id = SlotId::new();
        let slot = Slot::from_new(new_slot(1).with_id(id)).unwrap();
        assert_eq!(slot.id, id);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = Slot::from_new(new_slot(0));
        assert!(matches!(result, Err(SlotStoreError::InvalidSlot(_))));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut slot = new_slot(1);
        slot.end_time = slot.start_time;
        assert!(matches!(
            slot.validate(),
            Err(SlotStoreError::InvalidSlot(_))
        ));
    }

    #[test]
    fn serialization_roundtrip() {
        let slot = Slot::from_new(new_slot(2)).unwrap();
        let json = serde_json::to_string(&slot).unwrap();
        let deserialized: Slot = serde_json::from_str(&json).unwrap();
        assert_eq!(slot, deserialized);
    }
}

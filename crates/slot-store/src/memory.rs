use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CompensationId;
use tokio::sync::{Mutex, RwLock};

use crate::{NewSlot, Result, ServiceId, Slot, SlotId, SlotStoreError, store::SlotStore};

/// A slot together with the release keys already applied to it.
#[derive(Debug)]
struct SlotEntry {
    slot: Slot,
    applied_releases: HashSet<CompensationId>,
}

impl SlotEntry {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            applied_releases: HashSet::new(),
        }
    }
}

/// In-memory slot store.
///
/// Every slot sits behind its own mutex, so reserve/release on one slot never
/// waits on another. The outer map lock is only held long enough to find the
/// slot's mutex (or to insert a new slot). Release keys live with their slot.
#[derive(Clone, Default)]
pub struct InMemorySlotStore {
    slots: Arc<RwLock<HashMap<SlotId, Arc<Mutex<SlotEntry>>>>>,
    failing_releases: Arc<AtomicUsize>,
}

impl InMemorySlotStore {
    /// Creates a new empty in-memory slot store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of slots stored.
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Makes the next `count` release calls fail with a transient backend
    /// error without touching any slot. Passing zero clears the fault.
    pub fn fail_next_releases(&self, count: usize) {
        self.failing_releases.store(count, Ordering::SeqCst);
    }

    /// Number of release keys recorded for a slot.
    pub async fn applied_release_count(&self, id: SlotId) -> Result<usize> {
        let handle = self.slot_handle(id).await?;
        let entry = handle.lock().await;
        Ok(entry.applied_releases.len())
    }

    async fn slot_handle(&self, id: SlotId) -> Result<Arc<Mutex<SlotEntry>>> {
        self.slots
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SlotStoreError::SlotNotFound(id))
    }

    fn take_injected_release_failure(&self) -> bool {
        self.failing_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn create_slot(&self, new: NewSlot) -> Result<Slot> {
        let slot = Slot::from_new(new)?;
        let mut slots = self.slots.write().await;
        if slots.contains_key(&slot.id) {
            return Err(SlotStoreError::InvalidSlot(format!(
                "slot {} already exists",
                slot.id
            )));
        }
        slots.insert(slot.id, Arc::new(Mutex::new(SlotEntry::new(slot.clone()))));
        Ok(slot)
    }

    async fn get_slot(&self, id: SlotId) -> Result<Slot> {
        let handle = self.slot_handle(id).await?;
        let entry = handle.lock().await;
        Ok(entry.slot.clone())
    }

    async fn try_reserve(&self, id: SlotId) -> Result<Slot> {
        let handle = self.slot_handle(id).await?;
        let mut entry = handle.lock().await;
        let slot = &mut entry.slot;
        if slot.available == 0 {
            return Err(SlotStoreError::SlotUnavailable(id));
        }
        slot.available -= 1;
        Ok(slot.clone())
    }

    async fn release(&self, id: SlotId) -> Result<Slot> {
        if self.take_injected_release_failure() {
            return Err(SlotStoreError::Backend(
                "injected release failure".to_string(),
            ));
        }

        let handle = self.slot_handle(id).await?;
        let mut entry = handle.lock().await;
        let slot = &mut entry.slot;
        if slot.available >= slot.capacity {
            return Err(SlotStoreError::OverRelease {
                slot_id: id,
                capacity: slot.capacity,
            });
        }
        slot.available += 1;
        Ok(slot.clone())
    }

    async fn release_once(&self, id: SlotId, key: CompensationId) -> Result<Slot> {
        if self.take_injected_release_failure() {
            return Err(SlotStoreError::Backend(
                "injected release failure".to_string(),
            ));
        }

        let handle = self.slot_handle(id).await?;
        let mut entry = handle.lock().await;
        if entry.applied_releases.contains(&key) {
            tracing::debug!(slot_id = %id, release_key = %key, "release already applied");
            return Ok(entry.slot.clone());
        }
        if entry.slot.available >= entry.slot.capacity {
            return Err(SlotStoreError::OverRelease {
                slot_id: id,
                capacity: entry.slot.capacity,
            });
        }
        entry.slot.available += 1;
        entry.applied_releases.insert(key);
        Ok(entry.slot.clone())
    }

    async fn find_available(
        &self,
        service_id: ServiceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>> {
        let handles: Vec<_> = self.slots.read().await.values().cloned().collect();

        let mut slots = Vec::new();
        for handle in handles {
            let entry = handle.lock().await;
            let slot = &entry.slot;
            if slot.service_id == service_id
                && slot.is_available()
                && slot.start_time >= from
                && slot.start_time <= to
            {
                slots.push(slot.clone());
            }
        }

        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(slots)
    }
}

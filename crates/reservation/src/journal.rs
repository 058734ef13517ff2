//! Compensation journal: the durable saga record.
//!
//! Every capacity release that undoes a reservation is written here as
//! `Pending` before it is applied, and marked `Applied` (or `Skipped`)
//! afterwards. Each entry carries a release key (see
//! `CompensationRecord::release_key`) handed to `SlotStore::release_once`,
//! so re-running an entry after a crash or an ambiguous failure never gives
//! capacity back twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, CompensationId, SlotId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::state::CompensationState;

/// What a compensation undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompensationKind {
    /// Capacity was reserved but the booking could not be recorded.
    ReleaseAfterLedgerFailure,
    /// The booking was cancelled and its unit of capacity is owed back.
    ReleaseAfterCancellation,
}

impl CompensationKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationKind::ReleaseAfterLedgerFailure => "ReleaseAfterLedgerFailure",
            CompensationKind::ReleaseAfterCancellation => "ReleaseAfterCancellation",
        }
    }
}

impl std::fmt::Display for CompensationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CompensationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ReleaseAfterLedgerFailure" => Ok(CompensationKind::ReleaseAfterLedgerFailure),
            "ReleaseAfterCancellation" => Ok(CompensationKind::ReleaseAfterCancellation),
            other => Err(format!("unknown compensation kind: {other}")),
        }
    }
}

/// A compensation to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompensation {
    pub kind: CompensationKind,
    pub slot_id: SlotId,
    pub booking_id: BookingId,
}

impl NewCompensation {
    /// Undo a reservation whose booking `booking_id` failed to persist.
    pub fn release_after_ledger_failure(slot_id: SlotId, booking_id: BookingId) -> Self {
        Self {
            kind: CompensationKind::ReleaseAfterLedgerFailure,
            slot_id,
            booking_id,
        }
    }

    /// Return the capacity held by the cancelled booking `booking_id`.
    pub fn release_after_cancellation(slot_id: SlotId, booking_id: BookingId) -> Self {
        Self {
            kind: CompensationKind::ReleaseAfterCancellation,
            slot_id,
            booking_id,
        }
    }
}

/// A journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub id: CompensationId,
    pub kind: CompensationKind,
    pub slot_id: SlotId,
    /// The booking the compensation belongs to. For ledger failures this is
    /// the id the booking would have had.
    pub booking_id: BookingId,
    pub state: CompensationState,
    /// Release attempts made so far, across resumptions.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompensationRecord {
    /// Creates a `Pending` record.
    pub fn pending(new: NewCompensation) -> Self {
        let now = Utc::now();
        Self {
            id: CompensationId::new(),
            kind: new.kind,
            slot_id: new.slot_id,
            booking_id: new.booking_id,
            state: CompensationState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key handed to `SlotStore::release_once`.
    ///
    /// A cancelled booking owes exactly one unit back however many entries
    /// were written for it, so cancellations are keyed by the booking id.
    /// Ledger-failure entries are keyed by their own id.
    pub fn release_key(&self) -> CompensationId {
        match self.kind {
            CompensationKind::ReleaseAfterLedgerFailure => self.id,
            CompensationKind::ReleaseAfterCancellation => {
                CompensationId::from_uuid(self.booking_id.as_uuid())
            }
        }
    }

    /// Applies an outcome to the record, enforcing the state machine.
    pub fn apply(&mut self, outcome: &CompensationOutcome) -> Result<()> {
        if !self.state.can_transition_to(outcome.state) {
            return Err(JournalError::InvalidState {
                id: self.id,
                from: self.state,
                to: outcome.state,
            });
        }
        self.state = outcome.state;
        self.attempts = self.attempts.saturating_add(outcome.attempts);
        if outcome.last_error.is_some() {
            self.last_error = outcome.last_error.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// The result of running a compensation once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationOutcome {
    pub state: CompensationState,
    /// Attempts made in this run, added to the record's total.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl CompensationOutcome {
    pub fn applied(attempts: u32) -> Self {
        Self {
            state: CompensationState::Applied,
            attempts,
            last_error: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            state: CompensationState::Skipped,
            attempts: 0,
            last_error: Some(reason.into()),
        }
    }

    pub fn escalated(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            state: CompensationState::Escalated,
            attempts,
            last_error: Some(error.into()),
        }
    }
}

/// Errors that can occur when interacting with the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// No entry exists with the given id.
    #[error("Compensation not found: {0}")]
    NotFound(CompensationId),

    /// The entry is already settled.
    #[error("Compensation {id} cannot move from {from} to {to}")]
    InvalidState {
        id: CompensationId,
        from: CompensationState,
        to: CompensationState,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt compensation record: {0}")]
    Corrupt(String),

    /// The storage backend could not be reached.
    #[error("Journal storage unavailable: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Durable list of compensation records.
#[async_trait]
pub trait CompensationJournal: Send + Sync {
    /// Writes a new `Pending` entry.
    async fn record(&self, new: NewCompensation) -> Result<CompensationRecord>;

    /// Loads an entry by id.
    async fn get(&self, id: CompensationId) -> Result<CompensationRecord>;

    /// Settles or re-escalates an open entry.
    ///
    /// Fails with `InvalidState` if the entry is already terminal.
    async fn update(
        &self,
        id: CompensationId,
        outcome: CompensationOutcome,
    ) -> Result<CompensationRecord>;

    /// Entries still `Pending` or `Escalated`, oldest first.
    async fn open_entries(&self) -> Result<Vec<CompensationRecord>>;

    /// Open entries for a single slot, oldest first.
    async fn open_entries_for_slot(&self, slot_id: SlotId) -> Result<Vec<CompensationRecord>>;
}

#[derive(Debug, Default)]
struct JournalState {
    records: HashMap<CompensationId, (u64, CompensationRecord)>,
    next_seq: u64,
}

impl JournalState {
    fn open_sorted(&self, filter: impl Fn(&CompensationRecord) -> bool) -> Vec<CompensationRecord> {
        let mut open: Vec<_> = self
            .records
            .values()
            .filter(|(_, r)| r.state.is_open() && filter(r))
            .cloned()
            .collect();
        open.sort_by_key(|(seq, _)| *seq);
        open.into_iter().map(|(_, r)| r).collect()
    }
}

/// In-memory compensation journal.
#[derive(Clone, Default)]
pub struct InMemoryCompensationJournal {
    state: Arc<RwLock<JournalState>>,
    fail_on_record: Arc<AtomicBool>,
}

impl InMemoryCompensationJournal {
    /// Creates a new empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the journal to reject every new entry.
    pub fn set_fail_on_record(&self, fail: bool) {
        self.fail_on_record.store(fail, Ordering::SeqCst);
    }

    /// Returns every entry, oldest first.
    pub async fn entries(&self) -> Vec<CompensationRecord> {
        let state = self.state.read().await;
        let mut all: Vec<_> = state.records.values().cloned().collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, r)| r).collect()
    }
}

#[async_trait]
impl CompensationJournal for InMemoryCompensationJournal {
    async fn record(&self, new: NewCompensation) -> Result<CompensationRecord> {
        if self.fail_on_record.load(Ordering::SeqCst) {
            return Err(JournalError::Backend("injected record failure".to_string()));
        }

        let record = CompensationRecord::pending(new);
        let mut state = self.state.write().await;
        state.next_seq += 1;
        let seq = state.next_seq;
        state.records.insert(record.id, (seq, record.clone()));
        Ok(record)
    }

    async fn get(&self, id: CompensationId) -> Result<CompensationRecord> {
        self.state
            .read()
            .await
            .records
            .get(&id)
            .map(|(_, r)| r.clone())
            .ok_or(JournalError::NotFound(id))
    }

    async fn update(
        &self,
        id: CompensationId,
        outcome: CompensationOutcome,
    ) -> Result<CompensationRecord> {
        let mut state = self.state.write().await;
        let (_, record) = state
            .records
            .get_mut(&id)
            .ok_or(JournalError::NotFound(id))?;
        record.apply(&outcome)?;
        Ok(record.clone())
    }

    async fn open_entries(&self) -> Result<Vec<CompensationRecord>> {
        Ok(self.state.read().await.open_sorted(|_| true))
    }

    async fn open_entries_for_slot(&self, slot_id: SlotId) -> Result<Vec<CompensationRecord>> {
        Ok(self
            .state
            .read()
            .await
            .open_sorted(|r| r.slot_id == slot_id))
    }
}

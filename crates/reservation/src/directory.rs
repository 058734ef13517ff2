//! Read-only collaborators: the patient directory and the clinic catalog.
//!
//! Both are owned by upstream workflows. The engine only resolves patients
//! and joins clinic/service details into booking projections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ClinicId, PatientId, ServiceId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// A patient as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub user_id: UserId,
    pub display_name: String,
}

impl Patient {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id: PatientId::new(),
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// A clinic offering services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: ClinicId,
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// A bookable service of a clinic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub clinic_id: ClinicId,
    pub name: String,
    pub description: String,
    pub duration_min: u32,
    pub price_cents: i64,
}

/// Errors raised by directory and catalog lookups.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The user has no patient record.
    #[error("Patient record not found for user {0}")]
    PatientNotFound(UserId),

    /// A stored value could not be decoded.
    #[error("Corrupt directory record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Maps an authenticated user to a patient record.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Fails with `PatientNotFound` if the user has no patient record.
    async fn resolve_patient(&self, user_id: UserId) -> Result<Patient>;
}

/// Clinic and service details used to enrich bookings.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn clinic(&self, id: ClinicId) -> Result<Option<Clinic>>;

    async fn service(&self, id: ServiceId) -> Result<Option<Service>>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    patients: HashMap<UserId, Patient>,
    clinics: HashMap<ClinicId, Clinic>,
    services: HashMap<ServiceId, Service>,
}

/// In-memory patient directory and catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a patient, replacing any record for the same user.
    pub async fn add_patient(&self, patient: Patient) {
        self.state
            .write()
            .await
            .patients
            .insert(patient.user_id, patient);
    }

    pub async fn add_clinic(&self, clinic: Clinic) {
        self.state.write().await.clinics.insert(clinic.id, clinic);
    }

    pub async fn add_service(&self, service: Service) {
        self.state.write().await.services.insert(service.id, service);
    }
}

#[async_trait]
impl PatientDirectory for InMemoryDirectory {
    async fn resolve_patient(&self, user_id: UserId) -> Result<Patient> {
        self.state
            .read()
            .await
            .patients
            .get(&user_id)
            .cloned()
            .ok_or(DirectoryError::PatientNotFound(user_id))
    }
}

#[async_trait]
impl Catalog for InMemoryDirectory {
    async fn clinic(&self, id: ClinicId) -> Result<Option<Clinic>> {
        Ok(self.state.read().await.clinics.get(&id).cloned())
    }

    async fn service(&self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.state.read().await.services.get(&id).cloned())
    }
}

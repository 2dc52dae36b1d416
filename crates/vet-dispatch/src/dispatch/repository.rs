use std::future::Future;

use serde::{Deserialize, Serialize};

use super::candidate::ProviderCandidate;
use super::domain::{EmergencyRequest, GeoPoint, PetId, RequestId, UrgencyLevel};
use super::lifecycle::StatusChange;
use crate::shared::{ProviderId, RepositoryError};

/// Stored aggregate for one emergency request.
///
/// `version` increases by one on every successful write and is the token for
/// [`EmergencyRepository::compare_and_swap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub request: EmergencyRequest,
    pub history: Vec<StatusChange>,
    /// Provider ids from the most recent ranking; `None` until the request is first ranked.
    pub offered_providers: Option<Vec<ProviderId>>,
    pub version: u64,
}

impl EmergencyRecord {
    pub fn id(&self) -> &RequestId {
        &self.request.id
    }

    pub fn pet_id(&self) -> &PetId {
        &self.request.pet_id
    }

    pub fn was_offered(&self, provider: &ProviderId) -> bool {
        self.offered_providers
            .as_ref()
            .is_some_and(|offered| offered.contains(provider))
    }
}

/// Storage contract for emergency requests.
pub trait EmergencyRepository: Send + Sync {
    /// Stores a new record. Fails with [`RepositoryError::Conflict`] when the same pet
    /// already has a non-terminal request and [`RepositoryError::DuplicateId`] when the id
    /// is taken.
    fn insert(&self, record: EmergencyRecord) -> Result<EmergencyRecord, RepositoryError>;

    fn fetch(&self, id: &RequestId) -> Result<Option<EmergencyRecord>, RepositoryError>;

    /// Replaces the stored record only if its version still equals `expected_version`.
    /// The stored copy gets `expected_version + 1` and is returned.
    fn compare_and_swap(
        &self,
        record: EmergencyRecord,
        expected_version: u64,
    ) -> Result<EmergencyRecord, RepositoryError>;

    /// All records not yet in a terminal state.
    fn active(&self) -> Result<Vec<EmergencyRecord>, RepositoryError>;
}

/// Source of the provider pool considered for a request.
///
/// Usually remote; the dispatcher bounds each call with `directory_timeout_ms`.
pub trait ProviderDirectory: Send + Sync {
    fn available_providers(
        &self,
        urgency: UrgencyLevel,
        origin: GeoPoint,
    ) -> impl Future<Output = Result<Vec<ProviderCandidate>, RepositoryError>> + Send;
}

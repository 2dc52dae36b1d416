use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::dispatch::{
    emergency_router, Clock, EmergencyDispatcher, EmergencyRecord, EmergencyRepository,
    EmergencySubmission, GeoError, GeoPoint, GeoProvider, HaversineGeoProvider, PetId,
    ProviderCandidate, ProviderDirectory, RequestId, TravelEstimate, UrgencyLevel,
};
use crate::shared::{ProviderId, RepositoryError};

#[derive(Default, Clone)]
pub(super) struct MemoryEmergencyRepository {
    records: Arc<Mutex<HashMap<RequestId, EmergencyRecord>>>,
}

impl EmergencyRepository for MemoryEmergencyRepository {
    fn insert(&self, record: EmergencyRecord) -> Result<EmergencyRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        let pet_busy = guard.values().any(|existing| {
            existing.pet_id() == record.pet_id() && !existing.request.status.is_terminal()
        });
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::DuplicateId);
        }
        if pet_busy {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<EmergencyRecord>, RepositoryError> {
        Ok(self.records.lock().expect("lock").get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        mut record: EmergencyRecord,
        expected_version: u64,
    ) -> Result<EmergencyRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        let current = guard.get(record.id()).ok_or(RepositoryError::NotFound)?;
        if current.version != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found: current.version,
            });
        }
        record.version = expected_version + 1;
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn active(&self) -> Result<Vec<EmergencyRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("lock")
            .values()
            .filter(|record| !record.request.status.is_terminal())
            .cloned()
            .collect())
    }
}

pub(super) struct OfflineRepository;

impl EmergencyRepository for OfflineRepository {
    fn insert(&self, _record: EmergencyRecord) -> Result<EmergencyRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("503 from upstream".to_string()))
    }

    fn fetch(&self, _id: &RequestId) -> Result<Option<EmergencyRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("503 from upstream".to_string()))
    }

    fn compare_and_swap(
        &self,
        _record: EmergencyRecord,
        _expected_version: u64,
    ) -> Result<EmergencyRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("503 from upstream".to_string()))
    }

    fn active(&self) -> Result<Vec<EmergencyRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("503 from upstream".to_string()))
    }
}

/// Store whose id space is already used up by another writer.
pub(super) struct CollidingRepository;

impl EmergencyRepository for CollidingRepository {
    fn insert(&self, _record: EmergencyRecord) -> Result<EmergencyRecord, RepositoryError> {
        Err(RepositoryError::DuplicateId)
    }

    fn fetch(&self, _id: &RequestId) -> Result<Option<EmergencyRecord>, RepositoryError> {
        Ok(None)
    }

    fn compare_and_swap(
        &self,
        _record: EmergencyRecord,
        _expected_version: u64,
    ) -> Result<EmergencyRecord, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    fn active(&self) -> Result<Vec<EmergencyRecord>, RepositoryError> {
        Ok(Vec::new())
    }
}

#[derive(Default, Clone)]
pub(super) struct StaticDirectory {
    providers: Arc<Mutex<Vec<ProviderCandidate>>>,
}

impl StaticDirectory {
    pub(super) fn with(providers: Vec<ProviderCandidate>) -> Self {
        Self {
            providers: Arc::new(Mutex::new(providers)),
        }
    }

    pub(super) fn replace(&self, providers: Vec<ProviderCandidate>) {
        *self.providers.lock().expect("lock") = providers;
    }
}

impl ProviderDirectory for StaticDirectory {
    async fn available_providers(
        &self,
        _urgency: UrgencyLevel,
        _origin: GeoPoint,
    ) -> Result<Vec<ProviderCandidate>, RepositoryError> {
        Ok(self.providers.lock().expect("lock").clone())
    }
}

/// Directory whose lookups never complete.
pub(super) struct StalledDirectory;

impl ProviderDirectory for StalledDirectory {
    async fn available_providers(
        &self,
        _urgency: UrgencyLevel,
        _origin: GeoPoint,
    ) -> Result<Vec<ProviderCandidate>, RepositoryError> {
        std::future::pending().await
    }
}

/// Counts lookups and can be switched to fail.
#[derive(Default)]
pub(super) struct CountingGeo {
    calls: AtomicUsize,
    failing: bool,
}

impl CountingGeo {
    pub(super) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: true,
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeoProvider for CountingGeo {
    async fn distance_and_eta(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<TravelEstimate, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(GeoError::Unavailable("routing backend refused".to_string()));
        }
        Ok(HaversineGeoProvider::new(30.0).estimate(origin, destination))
    }
}

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap()),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("lock");
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("lock")
    }
}

pub(super) type TestDispatcher =
    EmergencyDispatcher<MemoryEmergencyRepository, StaticDirectory, CountingGeo>;

pub(super) struct Harness {
    pub(super) dispatcher: Arc<TestDispatcher>,
    pub(super) repository: MemoryEmergencyRepository,
    pub(super) directory: StaticDirectory,
    pub(super) geo: Arc<CountingGeo>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness_with(providers: Vec<ProviderCandidate>, geo: CountingGeo) -> Harness {
    let repository = MemoryEmergencyRepository::default();
    let directory = StaticDirectory::with(providers);
    let geo = Arc::new(geo);
    let clock = Arc::new(FixedClock::new());
    let dispatcher = Arc::new(EmergencyDispatcher::with_clock(
        Arc::new(repository.clone()),
        Arc::new(directory.clone()),
        geo.clone(),
        &DispatchConfig::default(),
        clock.clone(),
    ));
    Harness {
        dispatcher,
        repository,
        directory,
        geo,
        clock,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(pool(), CountingGeo::default())
}

pub(super) fn origin() -> GeoPoint {
    GeoPoint::new(19.4326, -99.1332)
}

pub(super) fn provider(id: &str, distance_km: f64, rating: f64, base_price: u32) -> ProviderCandidate {
    ProviderCandidate {
        provider_id: ProviderId::new(id),
        display_name: format!("Vet {id}"),
        specialty: "emergency".to_string(),
        rating,
        base_price,
        location: Some(origin()),
        distance_km: Some(distance_km),
        eta_minutes: Some(distance_km * 3.0),
    }
}

pub(super) fn pool() -> Vec<ProviderCandidate> {
    vec![
        provider("vet-far", 3.0, 4.0, 600),
        provider("vet-good", 1.2, 4.8, 650),
        provider("vet-best", 1.2, 4.9, 700),
    ]
}

pub(super) fn submission(pet: &str) -> EmergencySubmission {
    EmergencySubmission {
        pet_id: PetId(pet.to_string()),
        description: "Dog swallowed a sock, vomiting".to_string(),
        urgency_level: "high".to_string(),
        origin_location: Some(origin()),
    }
}

pub(super) fn router_with(harness: &Harness) -> axum::Router {
    emergency_router(harness.dispatcher.clone())
}

pub(super) async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

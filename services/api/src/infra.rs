use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use vet_dispatch::availability::{ScheduleRepository, WeeklySchedule};
use vet_dispatch::dispatch::{
    EmergencyRecord, EmergencyRepository, GeoPoint, ProviderCandidate, ProviderDirectory,
    RequestId, UrgencyLevel,
};
use vet_dispatch::shared::{ProviderId, RepositoryError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryScheduleRepository {
    schedules: Arc<Mutex<HashMap<ProviderId, WeeklySchedule>>>,
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn load(&self, provider: &ProviderId) -> Result<Option<WeeklySchedule>, RepositoryError> {
        let guard = self.schedules.lock().expect("schedule mutex poisoned");
        Ok(guard.get(provider).cloned())
    }

    fn save(
        &self,
        provider: &ProviderId,
        schedule: &WeeklySchedule,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.schedules.lock().expect("schedule mutex poisoned");
        guard.insert(provider.clone(), schedule.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEmergencyRepository {
    records: Arc<Mutex<HashMap<RequestId, EmergencyRecord>>>,
}

impl EmergencyRepository for InMemoryEmergencyRepository {
    fn insert(&self, record: EmergencyRecord) -> Result<EmergencyRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("emergency mutex poisoned");
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
        let guard = self.records.lock().expect("emergency mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        mut record: EmergencyRecord,
        expected_version: u64,
    ) -> Result<EmergencyRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("emergency mutex poisoned");
        let found = guard
            .get(record.id())
            .map(|current| current.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found,
            });
        }
        record.version = expected_version + 1;
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn active(&self) -> Result<Vec<EmergencyRecord>, RepositoryError> {
        let guard = self.records.lock().expect("emergency mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| !record.request.status.is_terminal())
            .cloned()
            .collect())
    }
}

/// Fixed provider roster. Distances are left empty so the matcher asks the geo provider.
#[derive(Clone)]
pub(crate) struct InMemoryProviderDirectory {
    providers: Arc<Vec<ProviderCandidate>>,
}

impl InMemoryProviderDirectory {
    pub(crate) fn seeded() -> Self {
        let roster = [
            ("vet-centro", "Clínica Veterinaria Centro", "general", 4.6, 650, 19.4340, -99.1410),
            ("vet-roma", "Hospital Roma Norte", "emergency", 4.9, 900, 19.4180, -99.1600),
            ("vet-coyoacan", "Coyoacán Pet Care", "surgery", 4.4, 700, 19.3500, -99.1620),
            ("groom-polanco", "Polanco Groom & Vet", "grooming", 4.1, 400, 19.4330, -99.1950),
            ("vet-mobile", "Mobile Vet Unit 7", "emergency", 4.7, 1100, 19.4420, -99.1250),
        ];

        let providers = roster
            .into_iter()
            .map(
                |(id, name, specialty, rating, price, lat, lng)| ProviderCandidate {
                    provider_id: ProviderId::new(id),
                    display_name: name.to_string(),
                    specialty: specialty.to_string(),
                    rating,
                    base_price: price,
                    location: Some(GeoPoint::new(lat, lng)),
                    distance_km: None,
                    eta_minutes: None,
                },
            )
            .collect();

        Self {
            providers: Arc::new(providers),
        }
    }
}

impl ProviderDirectory for InMemoryProviderDirectory {
    async fn available_providers(
        &self,
        urgency: UrgencyLevel,
        _origin: GeoPoint,
    ) -> Result<Vec<ProviderCandidate>, RepositoryError> {
        // Groomers only take low-urgency calls.
        Ok(self
            .providers
            .iter()
            .filter(|provider| urgency == UrgencyLevel::Low || provider.specialty != "grooming")
            .cloned()
            .collect())
    }
}

pub(crate) fn demo_origin() -> GeoPoint {
    GeoPoint::new(19.4326, -99.1332)
}

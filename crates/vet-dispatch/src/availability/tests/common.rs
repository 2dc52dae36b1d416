use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::availability::repository::ScheduleRepository;
use crate::availability::{availability_router, AvailabilityService, WeeklySchedule};
use crate::shared::{ProviderId, RepositoryError};

#[derive(Default, Clone)]
pub(super) struct MemoryScheduleRepository {
    schedules: Arc<Mutex<HashMap<ProviderId, WeeklySchedule>>>,
}

impl MemoryScheduleRepository {
    pub(super) fn stored(&self, provider: &ProviderId) -> Option<WeeklySchedule> {
        self.schedules.lock().expect("lock").get(provider).cloned()
    }
}

impl ScheduleRepository for MemoryScheduleRepository {
    fn load(&self, provider: &ProviderId) -> Result<Option<WeeklySchedule>, RepositoryError> {
        Ok(self.stored(provider))
    }

    fn save(
        &self,
        provider: &ProviderId,
        schedule: &WeeklySchedule,
    ) -> Result<(), RepositoryError> {
        self.schedules
            .lock()
            .expect("lock")
            .insert(provider.clone(), schedule.clone());
        Ok(())
    }
}

pub(super) struct OfflineScheduleRepository;

impl ScheduleRepository for OfflineScheduleRepository {
    fn load(&self, _provider: &ProviderId) -> Result<Option<WeeklySchedule>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection reset by peer".to_string()))
    }

    fn save(
        &self,
        _provider: &ProviderId,
        _schedule: &WeeklySchedule,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("connection reset by peer".to_string()))
    }
}

pub(super) fn provider() -> ProviderId {
    ProviderId::new("clinic-northside")
}

pub(super) fn build_service() -> (
    Arc<AvailabilityService<MemoryScheduleRepository>>,
    MemoryScheduleRepository,
) {
    let repository = MemoryScheduleRepository::default();
    let service = Arc::new(AvailabilityService::new(Arc::new(repository.clone())));
    (service, repository)
}

pub(super) fn router_with_service(
    service: Arc<AvailabilityService<MemoryScheduleRepository>>,
) -> axum::Router {
    availability_router(service)
}

pub(super) async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

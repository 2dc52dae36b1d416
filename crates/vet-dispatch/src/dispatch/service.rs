use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::candidate::RankedCandidates;
use super::clock::{Clock, SystemClock};
use super::domain::{
    EmergencyRequest, EmergencySubmission, PetId, RequestId, SubmissionError, UrgencyLevel,
};
use super::geo::{GeoError, GeoProvider};
use super::lifecycle::{EmergencyStatus, StatusChange};
use super::matcher::DispatchMatcher;
use super::repository::{EmergencyRecord, EmergencyRepository, ProviderDirectory};
use crate::config::{DispatchConfig, MAX_STALE_AFTER_MINUTES};
use crate::shared::{ProviderId, RepositoryError};

/// Drives emergency requests from intake to resolution.
///
/// Every write is an optimistic compare-and-swap on the record version. A writer that loses
/// the race re-reads the record and re-validates, so two conflicting transitions never both
/// apply: the second one sees the new status and fails with
/// [`DispatchError::InvalidTransition`].
pub struct EmergencyDispatcher<R, D, G> {
    repository: Arc<R>,
    directory: Arc<D>,
    matcher: DispatchMatcher<G>,
    clock: Arc<dyn Clock>,
    directory_timeout: Duration,
    stale_after: chrono::Duration,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("emr-{id:06}"))
}

impl<R, D, G> EmergencyDispatcher<R, D, G>
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, geo: Arc<G>, config: &DispatchConfig) -> Self {
        Self::with_clock(repository, directory, geo, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repository: Arc<R>,
        directory: Arc<D>,
        geo: Arc<G>,
        config: &DispatchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            directory,
            matcher: DispatchMatcher::new(geo, config),
            clock,
            directory_timeout: Duration::from_millis(config.directory_timeout_ms),
            stale_after: stale_window(config.stale_after_minutes),
        }
    }

    pub fn matcher(&self) -> &DispatchMatcher<G> {
        &self.matcher
    }

    /// Validate and store a new request in `Pending`.
    pub fn submit(
        &self,
        submission: EmergencySubmission,
    ) -> Result<EmergencyRequest, DispatchError> {
        let EmergencySubmission {
            pet_id,
            description,
            urgency_level,
            origin_location,
        } = submission;

        if pet_id.0.trim().is_empty() {
            return Err(SubmissionError::MissingPet.into());
        }
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(SubmissionError::EmptyDescription.into());
        }
        let urgency_level = UrgencyLevel::parse(&urgency_level)
            .ok_or(SubmissionError::InvalidUrgency(urgency_level))?;
        let origin_location = origin_location.ok_or(SubmissionError::MissingOrigin)?;
        if !origin_location.is_valid() {
            return Err(SubmissionError::InvalidOrigin.into());
        }

        let now = self.clock.now();
        let request = EmergencyRequest {
            id: next_request_id(),
            pet_id,
            description,
            urgency_level,
            origin_location,
            status: EmergencyStatus::Pending,
            assigned_provider_id: None,
            cancellation_reason: None,
            created_at: now,
            status_updated_at: now,
        };
        let record = EmergencyRecord {
            history: vec![StatusChange {
                status: EmergencyStatus::Pending,
                at: now,
                note: None,
            }],
            request,
            offered_providers: None,
            version: 0,
        };

        let pet_id = record.pet_id().clone();
        let request_id = record.id().clone();
        let stored = self.repository.insert(record).map_err(|err| match err {
            RepositoryError::Conflict => DispatchError::ActiveRequestExists { pet_id },
            RepositoryError::DuplicateId => {
                warn!(%request_id, "request id already taken in the store");
                upstream(err)
            }
            other => upstream(other),
        })?;

        info!(
            request_id = %stored.request.id,
            urgency = stored.request.urgency_level.label(),
            "emergency request submitted"
        );
        Ok(stored.request)
    }

    /// Rank the available providers for a pending request and record them as the offer set.
    ///
    /// An empty ranking still replaces the previous offer set before failing with
    /// [`DispatchError::NoCandidates`].
    pub async fn rank_candidates(
        &self,
        request_id: &RequestId,
    ) -> Result<RankedCandidates, DispatchError> {
        let record = self.fetch_record(request_id)?;
        ensure_pending(&record)?;

        let pool = tokio::time::timeout(
            self.directory_timeout,
            self.directory
                .available_providers(record.request.urgency_level, record.request.origin_location),
        )
        .await
        .map_err(|_| {
            let timeout_ms = self.directory_timeout.as_millis() as u64;
            warn!(%request_id, timeout_ms, "provider directory timed out");
            DispatchError::Upstream(UpstreamError::DirectoryTimeout(timeout_ms))
        })?
        .map_err(upstream)?;
        let pool_size = pool.len();
        let ranked = self
            .matcher
            .rank(pool, record.request.origin_location)
            .await
            .map_err(|err| {
                warn!(%request_id, error = %err, "geo lookup failed during ranking");
                DispatchError::Upstream(UpstreamError::Geo(err))
            })?;

        let offered = ranked.provider_ids();
        self.write(request_id, |record| {
            ensure_pending(record)?;
            record.offered_providers = Some(offered.clone());
            Ok(())
        })?;

        debug!(
            %request_id,
            pool = pool_size,
            ranked = ranked.candidates.len(),
            excluded = ranked.excluded_count(),
            "candidates recorded"
        );

        if ranked.is_empty() {
            return Err(DispatchError::NoCandidates {
                request_id: request_id.clone(),
                excluded: ranked.excluded_count(),
            });
        }
        Ok(ranked)
    }

    pub fn assign(
        &self,
        request_id: &RequestId,
        provider_id: &ProviderId,
    ) -> Result<EmergencyRequest, DispatchError> {
        let request = self.transition(request_id, EmergencyStatus::Assigned, None, |record| {
            if !record.was_offered(provider_id) {
                return Err(DispatchError::CandidateNotEligible {
                    request_id: request_id.clone(),
                    provider_id: provider_id.clone(),
                });
            }
            record.request.assigned_provider_id = Some(provider_id.clone());
            Ok(())
        })?;
        info!(%request_id, provider = %provider_id, "provider assigned");
        Ok(request)
    }

    pub fn mark_en_route(&self, request_id: &RequestId) -> Result<EmergencyRequest, DispatchError> {
        self.transition(request_id, EmergencyStatus::EnRoute, None, |_| Ok(()))
    }

    pub fn mark_attended(&self, request_id: &RequestId) -> Result<EmergencyRequest, DispatchError> {
        self.transition(request_id, EmergencyStatus::Attended, None, |_| Ok(()))
    }

    pub fn cancel(
        &self,
        request_id: &RequestId,
        reason: impl Into<String>,
    ) -> Result<EmergencyRequest, DispatchError> {
        let reason = reason.into().trim().to_string();
        let note = (!reason.is_empty()).then_some(reason);
        self.transition(request_id, EmergencyStatus::Cancelled, note.clone(), |record| {
            record.request.cancellation_reason = note.clone();
            Ok(())
        })
    }

    pub fn describe(&self, request_id: &RequestId) -> Result<EmergencyRequest, DispatchError> {
        Ok(self.fetch_record(request_id)?.request)
    }

    pub fn history(&self, request_id: &RequestId) -> Result<Vec<StatusChange>, DispatchError> {
        Ok(self.fetch_record(request_id)?.history)
    }

    /// Non-terminal requests whose last status change is older than the configured threshold.
    pub fn stale_requests(&self) -> Result<Vec<EmergencyRequest>, DispatchError> {
        let Some(cutoff) = self.clock.now().checked_sub_signed(self.stale_after) else {
            return Ok(Vec::new());
        };
        let mut stale: Vec<EmergencyRequest> = self
            .repository
            .active()
            .map_err(upstream)?
            .into_iter()
            .map(|record| record.request)
            .filter(|request| !request.status.is_terminal() && request.status_updated_at < cutoff)
            .collect();
        stale.sort_by(|a, b| a.status_updated_at.cmp(&b.status_updated_at));
        Ok(stale)
    }

    fn fetch_record(&self, request_id: &RequestId) -> Result<EmergencyRecord, DispatchError> {
        self.repository
            .fetch(request_id)
            .map_err(upstream)?
            .ok_or_else(|| DispatchError::NotFound(request_id.clone()))
    }

    fn transition<F>(
        &self,
        request_id: &RequestId,
        target: EmergencyStatus,
        note: Option<String>,
        mut apply: F,
    ) -> Result<EmergencyRequest, DispatchError>
    where
        F: FnMut(&mut EmergencyRecord) -> Result<(), DispatchError>,
    {
        let stored = self.write(request_id, |record| {
            let current = record.request.status;
            if !current.can_transition_to(target) {
                return Err(DispatchError::InvalidTransition {
                    request_id: request_id.clone(),
                    current,
                    requested: target,
                });
            }
            apply(record)?;

            let now = self.clock.now();
            record.request.status = target;
            record.request.status_updated_at = now;
            record.history.push(StatusChange {
                status: target,
                at: now,
                note: note.clone(),
            });
            Ok(())
        })?;

        info!(%request_id, status = %target, "emergency request transitioned");
        Ok(stored.request)
    }

    /// Read-modify-write loop; `mutate` runs against a fresh copy on every attempt.
    fn write<F>(&self, request_id: &RequestId, mut mutate: F) -> Result<EmergencyRecord, DispatchError>
    where
        F: FnMut(&mut EmergencyRecord) -> Result<(), DispatchError>,
    {
        loop {
            let mut record = self.fetch_record(request_id)?;
            let expected = record.version;
            mutate(&mut record)?;

            match self.repository.compare_and_swap(record, expected) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::VersionMismatch { expected, found }) => {
                    debug!(%request_id, expected, found, "concurrent write detected, retrying");
                }
                Err(RepositoryError::NotFound) => {
                    return Err(DispatchError::NotFound(request_id.clone()))
                }
                Err(other) => return Err(upstream(other)),
            }
        }
    }
}

fn stale_window(minutes: i64) -> chrono::Duration {
    chrono::Duration::try_minutes(minutes.clamp(1, MAX_STALE_AFTER_MINUTES))
        .unwrap_or_else(|| chrono::Duration::days(365))
}

fn ensure_pending(record: &EmergencyRecord) -> Result<(), DispatchError> {
    match record.request.status {
        EmergencyStatus::Pending => Ok(()),
        current => Err(DispatchError::InvalidTransition {
            request_id: record.id().clone(),
            current,
            requested: EmergencyStatus::Assigned,
        }),
    }
}

fn upstream(err: RepositoryError) -> DispatchError {
    warn!(error = %err, "emergency store call failed");
    DispatchError::Upstream(UpstreamError::Repository(err))
}

/// Collaborator failures surfaced through [`DispatchError::Upstream`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Geo(GeoError),
    #[error("provider directory timed out after {0} ms")]
    DirectoryTimeout(u64),
}

/// Error raised by the emergency dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] SubmissionError),
    #[error("request {request_id} is {current} and cannot move to {requested}")]
    InvalidTransition {
        request_id: RequestId,
        current: EmergencyStatus,
        requested: EmergencyStatus,
    },
    #[error("provider {provider_id} was not among the candidates offered for request {request_id}")]
    CandidateNotEligible {
        request_id: RequestId,
        provider_id: ProviderId,
    },
    #[error("no providers available for request {request_id} ({excluded} excluded)")]
    NoCandidates { request_id: RequestId, excluded: usize },
    #[error("emergency request {0} not found")]
    NotFound(RequestId),
    #[error("pet {pet_id} already has an active emergency request")]
    ActiveRequestExists { pet_id: PetId },
    #[error("upstream collaborator unavailable")]
    Upstream(#[source] UpstreamError),
}

impl DispatchError {
    pub const fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::CandidateNotEligible { .. } => "candidate_not_eligible",
            DispatchError::NoCandidates { .. } => "no_candidates",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::ActiveRequestExists { .. } => "active_request_exists",
            DispatchError::Upstream(_) => "upstream_unavailable",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DispatchError::Validation(err) => err.to_string(),
            DispatchError::InvalidTransition {
                current, requested, ..
            } => match current {
                EmergencyStatus::Cancelled => "This request was already cancelled.".to_string(),
                EmergencyStatus::Attended => "This request has already been attended.".to_string(),
                _ => format!(
                    "This request is {} and cannot be marked {}.",
                    current.label().replace('_', " "),
                    requested.label().replace('_', " ")
                ),
            },
            DispatchError::CandidateNotEligible { .. } => {
                "That provider was not offered this request; refresh the candidate list.".to_string()
            }
            DispatchError::NoCandidates { .. } => {
                "No providers are currently available.".to_string()
            }
            DispatchError::NotFound(_) => "Emergency request not found.".to_string(),
            DispatchError::ActiveRequestExists { .. } => {
                "This pet already has an emergency request in progress.".to_string()
            }
            DispatchError::Upstream(_) => {
                "The dispatch service is temporarily unavailable, please try again.".to_string()
            }
        }
    }
}

//! Emergency request intake, candidate ranking, and lifecycle management.

pub mod candidate;
pub mod clock;
pub mod domain;
pub mod geo;
pub mod lifecycle;
pub mod matcher;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use candidate::{ExcludedCandidate, ExclusionReason, ProviderCandidate, RankedCandidates};
pub use clock::{Clock, SystemClock};
pub use domain::{
    EmergencyRequest, EmergencySubmission, GeoPoint, PetId, RequestId, SubmissionError,
    UrgencyLevel,
};
pub use geo::{GeoError, GeoProvider, HaversineGeoProvider, TravelEstimate};
pub use lifecycle::{EmergencyStatus, StatusChange};
pub use matcher::DispatchMatcher;
pub use repository::{EmergencyRecord, EmergencyRepository, ProviderDirectory};
pub use router::emergency_router;
pub use service::{DispatchError, EmergencyDispatcher, UpstreamError};

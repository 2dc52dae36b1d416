use serde::{Deserialize, Serialize};

use super::domain::GeoPoint;
use crate::shared::ProviderId;

/// A provider as considered for one dispatch attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub provider_id: ProviderId,
    pub display_name: String,
    pub specialty: String,
    /// 0.0 to 5.0.
    pub rating: f64,
    pub base_price: u32,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub eta_minutes: Option<f64>,
}

impl ProviderCandidate {
    pub(crate) fn has_valid_profile(&self) -> bool {
        self.rating.is_finite() && (0.0..=5.0).contains(&self.rating)
    }

    pub(crate) fn precomputed_travel(&self) -> Option<(f64, f64)> {
        match (self.distance_km, self.eta_minutes) {
            (Some(distance), Some(eta))
                if distance.is_finite() && distance >= 0.0 && eta.is_finite() && eta >= 0.0 =>
            {
                Some((distance, eta))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingLocation,
    InvalidLocation,
    InvalidProfile,
    Duplicate,
    OutOfRange,
}

/// A candidate left out of ranking, kept so callers can see why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub provider_id: ProviderId,
    pub reason: ExclusionReason,
}

/// Result of ranking a pool: eligible candidates in offer order plus the exclusions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidates {
    pub candidates: Vec<ProviderCandidate>,
    pub excluded: Vec<ExcludedCandidate>,
}

impl RankedCandidates {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.candidates
            .iter()
            .map(|candidate| candidate.provider_id.clone())
            .collect()
    }
}

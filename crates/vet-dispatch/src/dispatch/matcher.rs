use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::candidate::{ExcludedCandidate, ExclusionReason, ProviderCandidate, RankedCandidates};
use super::domain::GeoPoint;
use super::geo::{GeoError, GeoProvider, TravelEstimate};
use crate::config::DispatchConfig;

/// Longer than any great-circle route; larger travel distances are treated as bad data.
const MAX_TRAVEL_DISTANCE_KM: f64 = 20_100.0;

/// Orders a candidate pool for an emergency request.
///
/// Nearest first; distances equal at `tie_precision_km` fall back to higher rating, then
/// lower base price, then provider id. Reported distances are rounded to the same precision
/// so the published order is consistent with the published numbers.
pub struct DispatchMatcher<G> {
    geo: Arc<G>,
    tie_precision_km: f64,
    max_distance_km: Option<f64>,
    geo_timeout: Duration,
}

struct Scored {
    bucket: i64,
    candidate: ProviderCandidate,
}

impl<G> DispatchMatcher<G>
where
    G: GeoProvider,
{
    pub fn new(geo: Arc<G>, config: &DispatchConfig) -> Self {
        Self {
            geo,
            tie_precision_km: config.tie_precision_km,
            max_distance_km: config.max_distance_km,
            geo_timeout: Duration::from_millis(config.geo_timeout_ms),
        }
    }

    /// Ranks `candidates` against `origin`.
    ///
    /// Fails only when the geo provider fails; nothing is cached beyond this call.
    pub async fn rank(
        &self,
        candidates: Vec<ProviderCandidate>,
        origin: GeoPoint,
    ) -> Result<RankedCandidates, GeoError> {
        let mut excluded = Vec::new();
        let mut seen = HashSet::new();
        let mut estimates: HashMap<(u64, u64), TravelEstimate> = HashMap::new();
        let mut scored = Vec::with_capacity(candidates.len());

        for mut candidate in candidates {
            let exclude = |candidate: &ProviderCandidate, reason| ExcludedCandidate {
                provider_id: candidate.provider_id.clone(),
                reason,
            };

            if !seen.insert(candidate.provider_id.clone()) {
                excluded.push(exclude(&candidate, ExclusionReason::Duplicate));
                continue;
            }
            let Some(location) = candidate.location else {
                excluded.push(exclude(&candidate, ExclusionReason::MissingLocation));
                continue;
            };
            if !location.is_valid() {
                excluded.push(exclude(&candidate, ExclusionReason::InvalidLocation));
                continue;
            }
            if !candidate.has_valid_profile() {
                excluded.push(exclude(&candidate, ExclusionReason::InvalidProfile));
                continue;
            }

            let (distance_km, eta_minutes) = match candidate.precomputed_travel() {
                Some(travel) => travel,
                None => {
                    let key = (location.lat.to_bits(), location.lng.to_bits());
                    let estimate = match estimates.get(&key) {
                        Some(estimate) => *estimate,
                        None => {
                            let estimate = self.lookup(origin, location).await?;
                            estimates.insert(key, estimate);
                            estimate
                        }
                    };
                    (estimate.distance_km, estimate.eta_minutes)
                }
            };

            if self
                .max_distance_km
                .is_some_and(|max_distance| distance_km > max_distance)
            {
                excluded.push(exclude(&candidate, ExclusionReason::OutOfRange));
                continue;
            }

            let Some(bucket) = self.bucket(distance_km) else {
                excluded.push(exclude(&candidate, ExclusionReason::InvalidProfile));
                continue;
            };
            candidate.distance_km = Some(bucket as f64 * self.tie_precision_km);
            candidate.eta_minutes = Some(eta_minutes);
            scored.push(Scored { bucket, candidate });
        }

        scored.sort_by(compare);

        debug!(
            ranked = scored.len(),
            excluded = excluded.len(),
            geo_lookups = estimates.len(),
            "candidate pool ranked"
        );

        Ok(RankedCandidates {
            candidates: scored.into_iter().map(|scored| scored.candidate).collect(),
            excluded,
        })
    }

    fn bucket(&self, distance_km: f64) -> Option<i64> {
        if distance_km > MAX_TRAVEL_DISTANCE_KM {
            return None;
        }
        let bucket = (distance_km / self.tie_precision_km).round();
        (bucket.is_finite() && bucket < i64::MAX as f64).then_some(bucket as i64)
    }

    async fn lookup(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<TravelEstimate, GeoError> {
        let estimate = tokio::time::timeout(
            self.geo_timeout,
            self.geo.distance_and_eta(origin, destination),
        )
        .await
        .map_err(|_| GeoError::Timeout(self.geo_timeout.as_millis() as u64))??;

        if estimate.distance_km.is_finite() && estimate.distance_km >= 0.0 {
            Ok(estimate)
        } else {
            Err(GeoError::Unavailable(format!(
                "non-finite distance {}",
                estimate.distance_km
            )))
        }
    }
}

fn compare(a: &Scored, b: &Scored) -> Ordering {
    a.bucket
        .cmp(&b.bucket)
        .then_with(|| b.candidate.rating.total_cmp(&a.candidate.rating))
        .then_with(|| a.candidate.base_price.cmp(&b.candidate.base_price))
        .then_with(|| a.candidate.provider_id.cmp(&b.candidate.provider_id))
}

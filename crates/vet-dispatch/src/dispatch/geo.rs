use std::future::Future;

use serde::{Deserialize, Serialize};

use super::domain::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Distance and travel time between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelEstimate {
    pub distance_km: f64,
    pub eta_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("geo lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("geo provider unavailable: {0}")]
    Unavailable(String),
}

/// Distance/ETA capability consumed by the matcher.
///
/// Implementations must return the same estimate for the same inputs within one
/// dispatch attempt; the matcher caches by destination.
pub trait GeoProvider: Send + Sync {
    fn distance_and_eta(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> impl Future<Output = Result<TravelEstimate, GeoError>> + Send;
}

/// Great-circle distance with a flat average speed for the ETA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaversineGeoProvider {
    average_speed_kmh: f64,
}

impl HaversineGeoProvider {
    pub fn new(average_speed_kmh: f64) -> Self {
        Self { average_speed_kmh }
    }

    pub fn estimate(&self, origin: GeoPoint, destination: GeoPoint) -> TravelEstimate {
        let distance_km = haversine_km(origin, destination);
        let eta_minutes = if self.average_speed_kmh > 0.0 {
            distance_km / self.average_speed_kmh * 60.0
        } else {
            f64::INFINITY
        };
        TravelEstimate {
            distance_km,
            eta_minutes,
        }
    }
}

impl GeoProvider for HaversineGeoProvider {
    async fn distance_and_eta(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<TravelEstimate, GeoError> {
        Ok(self.estimate(origin, destination))
    }
}

pub fn haversine_km(origin: GeoPoint, destination: GeoPoint) -> f64 {
    let (lat1, lat2) = (origin.lat.to_radians(), destination.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (destination.lng - origin.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

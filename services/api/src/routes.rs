use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use vet_dispatch::availability::{availability_router, AvailabilityService, ScheduleRepository};
use vet_dispatch::dispatch::{
    emergency_router, EmergencyDispatcher, EmergencyRepository, GeoProvider, ProviderDirectory,
};

pub(crate) fn with_service_routes<S, R, D, G>(
    availability: Arc<AvailabilityService<S>>,
    dispatcher: Arc<EmergencyDispatcher<R, D, G>>,
) -> axum::Router
where
    S: ScheduleRepository + 'static,
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    availability_router(availability)
        .merge(emergency_router(dispatcher))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;

use super::domain::{TimeOfDay, WeeklySchedule, SLOT_MINUTES};
use super::repository::ScheduleRepository;
use super::service::{AvailabilityError, AvailabilityService};
use crate::shared::ProviderId;

/// Router builder exposing schedule editing and open-at lookups.
pub fn availability_router<R>(service: Arc<AvailabilityService<R>>) -> Router
where
    R: ScheduleRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/providers/:provider_id/schedule",
            get(schedule_handler::<R>).put(replace_handler::<R>),
        )
        .route(
            "/api/v1/providers/:provider_id/schedule/:day",
            axum::routing::put(set_day_handler::<R>).delete(clear_day_handler::<R>),
        )
        .route(
            "/api/v1/providers/:provider_id/availability",
            get(open_at_handler::<R>),
        )
        .route("/api/v1/schedule/time-options", get(time_options_handler::<R>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DayHoursRequest {
    pub(crate) opens_at: TimeOfDay,
    pub(crate) closes_at: TimeOfDay,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAtQuery {
    pub(crate) at: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeOptionsQuery {
    pub(crate) granularity: Option<u16>,
}

pub(crate) fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
}

pub(crate) async fn schedule_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Path(provider_id): Path<String>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    match service.view(&ProviderId(provider_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn replace_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Path(provider_id): Path<String>,
    axum::Json(schedule): axum::Json<WeeklySchedule>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    match service.replace(&ProviderId(provider_id), schedule) {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn set_day_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Path((provider_id, day)): Path<(String, u8)>,
    axum::Json(hours): axum::Json<DayHoursRequest>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    match service.set_day(&ProviderId(provider_id), day, hours.opens_at, hours.closes_at) {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn clear_day_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Path((provider_id, day)): Path<(String, u8)>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    match service.clear_day(&ProviderId(provider_id), day) {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn open_at_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Path(provider_id): Path<String>,
    Query(query): Query<OpenAtQuery>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    let Some(instant) = parse_instant(&query.at) else {
        let payload = json!({
            "error_kind": "validation",
            "error": format!("'{}' is not a YYYY-MM-DDTHH:MM timestamp", query.at),
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    let provider_id = ProviderId(provider_id);
    match service.is_open(&provider_id, instant) {
        Ok(open) => {
            let payload = json!({
                "provider_id": provider_id,
                "at": instant.format("%Y-%m-%dT%H:%M").to_string(),
                "open": open,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn time_options_handler<R>(
    State(service): State<Arc<AvailabilityService<R>>>,
    Query(query): Query<TimeOptionsQuery>,
) -> Response
where
    R: ScheduleRepository + 'static,
{
    let granularity = query.granularity.unwrap_or(SLOT_MINUTES);
    match service.manager().list_time_options(granularity) {
        Ok(options) => (StatusCode::OK, axum::Json(options)).into_response(),
        Err(error) => error_response(AvailabilityError::Validation(error)),
    }
}

fn error_response(error: AvailabilityError) -> Response {
    let status = match error {
        AvailabilityError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AvailabilityError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let payload = json!({
        "error_kind": error.kind(),
        "error": error.user_message(),
    });
    (status, axum::Json(payload)).into_response()
}

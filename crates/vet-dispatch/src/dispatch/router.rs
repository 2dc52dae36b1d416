use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{EmergencySubmission, RequestId};
use super::geo::GeoProvider;
use super::repository::{EmergencyRepository, ProviderDirectory};
use super::service::{DispatchError, EmergencyDispatcher};
use crate::shared::ProviderId;

type SharedDispatcher<R, D, G> = Arc<EmergencyDispatcher<R, D, G>>;

/// Router builder exposing emergency intake, ranking, and lifecycle transitions.
pub fn emergency_router<R, D, G>(dispatcher: SharedDispatcher<R, D, G>) -> Router
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    Router::new()
        .route("/api/v1/emergencies", post(submit_handler::<R, D, G>))
        .route(
            "/api/v1/emergencies/:request_id",
            get(describe_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/history",
            get(history_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/candidates",
            post(candidates_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/assign",
            post(assign_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/en-route",
            post(en_route_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/attended",
            post(attended_handler::<R, D, G>),
        )
        .route(
            "/api/v1/emergencies/:request_id/cancel",
            post(cancel_handler::<R, D, G>),
        )
        .with_state(dispatcher)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    pub(crate) provider_id: ProviderId,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CancelRequest {
    #[serde(default)]
    pub(crate) reason: String,
}

pub(crate) async fn submit_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    axum::Json(submission): axum::Json<EmergencySubmission>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.submit(submission) {
        Ok(request) => (StatusCode::CREATED, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn describe_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.describe(&RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.history(&RequestId(request_id)) {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn candidates_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.rank_candidates(&RequestId(request_id)).await {
        Ok(ranked) => {
            let payload = json!({
                "candidates": ranked.candidates,
                "excluded": ranked.excluded,
                "excluded_count": ranked.excluded_count(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assign_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<AssignRequest>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.assign(&RequestId(request_id), &body.provider_id) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn en_route_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.mark_en_route(&RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attended_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    match dispatcher.mark_attended(&RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<R, D, G>(
    State(dispatcher): State<SharedDispatcher<R, D, G>>,
    Path(request_id): Path<String>,
    body: Option<axum::Json<CancelRequest>>,
) -> Response
where
    R: EmergencyRepository + 'static,
    D: ProviderDirectory + 'static,
    G: GeoProvider + 'static,
{
    let reason = body.map(|axum::Json(body)| body.reason).unwrap_or_default();
    match dispatcher.cancel(&RequestId(request_id), reason) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Maps a dispatch error onto a status code and a user-facing message; transport detail
/// from collaborators never reaches the body.
pub(crate) fn error_response(error: DispatchError) -> Response {
    let status = match &error {
        DispatchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::InvalidTransition { .. }
        | DispatchError::CandidateNotEligible { .. }
        | DispatchError::ActiveRequestExists { .. } => StatusCode::CONFLICT,
        DispatchError::NoCandidates { .. } | DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let mut payload = json!({
        "error_kind": error.kind(),
        "error": error.user_message(),
    });
    if let DispatchError::InvalidTransition {
        current, requested, ..
    } = &error
    {
        payload["current_status"] = json!(current);
        payload["requested_status"] = json!(requested);
    }
    if let DispatchError::NoCandidates { excluded, .. } = &error {
        payload["excluded_count"] = json!(excluded);
    }

    (status, axum::Json(payload)).into_response()
}

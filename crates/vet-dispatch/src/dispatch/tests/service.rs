use super::common::*;
use crate::config::DispatchConfig;
use crate::dispatch::{
    DispatchError, EmergencyDispatcher, EmergencyRepository, EmergencyStatus, GeoPoint,
    SubmissionError, UpstreamError, UrgencyLevel,
};
use crate::shared::{ProviderId, RepositoryError};
use chrono::Duration;
use std::sync::Arc;

#[test]
fn submit_creates_pending_request() {
    let h = harness();

    let request = h.dispatcher.submit(submission("pet-rex")).expect("submits");

    assert_eq!(request.status, EmergencyStatus::Pending);
    assert_eq!(request.urgency_level, UrgencyLevel::High);
    assert!(request.id.0.starts_with("emr-"));
    assert_eq!(request.created_at, request.status_updated_at);
    assert!(request.assigned_provider_id.is_none());
}

#[test]
fn submit_validates_payload() {
    let h = harness();

    let mut blank = submission("pet-a");
    blank.description = "   ".to_string();
    let mut bad_urgency = submission("pet-b");
    bad_urgency.urgency_level = "critical".to_string();
    let mut no_origin = submission("pet-c");
    no_origin.origin_location = None;
    let mut bad_origin = submission("pet-d");
    bad_origin.origin_location = Some(GeoPoint::new(95.0, 10.0));

    let cases = [
        (blank, SubmissionError::EmptyDescription),
        (
            bad_urgency,
            SubmissionError::InvalidUrgency("critical".to_string()),
        ),
        (no_origin, SubmissionError::MissingOrigin),
        (bad_origin, SubmissionError::InvalidOrigin),
    ];

    for (payload, expected) in cases {
        match h.dispatcher.submit(payload) {
            Err(DispatchError::Validation(error)) => assert_eq!(error, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }
    assert!(h.repository.active().expect("active").is_empty());
}

#[test]
fn second_active_request_for_same_pet_is_rejected() {
    let h = harness();
    let first = h.dispatcher.submit(submission("pet-rex")).expect("submits");

    match h.dispatcher.submit(submission("pet-rex")) {
        Err(DispatchError::ActiveRequestExists { pet_id }) => assert_eq!(pet_id.0, "pet-rex"),
        other => panic!("expected active request conflict, got {other:?}"),
    }

    h.dispatcher
        .cancel(&first.id, "owner drove to clinic")
        .expect("cancels");
    h.dispatcher
        .submit(submission("pet-rex"))
        .expect("pet is free again after cancellation");
}

#[test]
fn mark_en_route_requires_assignment() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-luna")).expect("submits");

    match h.dispatcher.mark_en_route(&request.id) {
        Err(DispatchError::InvalidTransition {
            current, requested, ..
        }) => {
            assert_eq!(current, EmergencyStatus::Pending);
            assert_eq!(requested, EmergencyStatus::EnRoute);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(
        h.dispatcher.describe(&request.id).expect("exists").status,
        EmergencyStatus::Pending
    );
}

#[tokio::test]
async fn full_lifecycle_records_history() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-milo")).expect("submits");

    let ranked = h
        .dispatcher
        .rank_candidates(&request.id)
        .await
        .expect("ranks");
    let top = ranked.candidates[0].provider_id.clone();
    assert_eq!(top.as_str(), "vet-best");

    h.clock.advance(Duration::minutes(2));
    let assigned = h.dispatcher.assign(&request.id, &top).expect("assigns");
    assert_eq!(assigned.assigned_provider_id, Some(top));
    assert!(assigned.status_updated_at > assigned.created_at);

    h.clock.advance(Duration::minutes(1));
    h.dispatcher.mark_en_route(&request.id).expect("en route");
    h.clock.advance(Duration::minutes(15));
    let attended = h.dispatcher.mark_attended(&request.id).expect("attended");
    assert_eq!(attended.status, EmergencyStatus::Attended);

    let history = h.dispatcher.history(&request.id).expect("history");
    let statuses: Vec<EmergencyStatus> = history.iter().map(|change| change.status).collect();
    assert_eq!(
        statuses,
        vec![
            EmergencyStatus::Pending,
            EmergencyStatus::Assigned,
            EmergencyStatus::EnRoute,
            EmergencyStatus::Attended,
        ]
    );
    assert!(EmergencyStatus::is_valid_path(&statuses));
    assert!(history.windows(2).all(|pair| pair[0].at <= pair[1].at));

    match h.dispatcher.cancel(&request.id, "too late") {
        Err(DispatchError::InvalidTransition { current, .. }) => {
            assert_eq!(current, EmergencyStatus::Attended)
        }
        other => panic!("terminal requests must not change, got {other:?}"),
    }
}

#[tokio::test]
async fn assign_rejects_provider_outside_last_ranking() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-kira")).expect("submits");

    match h.dispatcher.assign(&request.id, &ProviderId::new("vet-best")) {
        Err(DispatchError::CandidateNotEligible { .. }) => {}
        other => panic!("unranked requests have no eligible providers, got {other:?}"),
    }

    h.dispatcher
        .rank_candidates(&request.id)
        .await
        .expect("ranks");
    match h.dispatcher.assign(&request.id, &ProviderId::new("vet-stranger")) {
        Err(DispatchError::CandidateNotEligible { provider_id, .. }) => {
            assert_eq!(provider_id.as_str(), "vet-stranger")
        }
        other => panic!("expected not eligible, got {other:?}"),
    }
    assert_eq!(
        h.dispatcher.describe(&request.id).expect("exists").status,
        EmergencyStatus::Pending
    );
}

#[tokio::test]
async fn reranking_replaces_the_offer_set() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-ozzy")).expect("submits");
    h.dispatcher
        .rank_candidates(&request.id)
        .await
        .expect("ranks");

    h.directory.replace(vec![provider("vet-night", 4.0, 4.2, 900)]);
    h.dispatcher
        .rank_candidates(&request.id)
        .await
        .expect("ranks again");

    assert!(matches!(
        h.dispatcher.assign(&request.id, &ProviderId::new("vet-best")),
        Err(DispatchError::CandidateNotEligible { .. })
    ));
    h.dispatcher
        .assign(&request.id, &ProviderId::new("vet-night"))
        .expect("latest candidate can be assigned");
}

#[tokio::test]
async fn empty_pool_is_reported_as_no_candidates() {
    let mut nowhere = provider("vet-nowhere", 1.0, 4.0, 100);
    nowhere.location = None;
    let h = harness_with(vec![nowhere], CountingGeo::default());
    let request = h.dispatcher.submit(submission("pet-bo")).expect("submits");

    match h.dispatcher.rank_candidates(&request.id).await {
        Err(DispatchError::NoCandidates { excluded, .. }) => assert_eq!(excluded, 1),
        other => panic!("expected no candidates, got {other:?}"),
    }
}

#[tokio::test]
async fn geo_failure_leaves_request_untouched() {
    let mut remote = provider("vet-remote", 0.0, 4.0, 100);
    remote.distance_km = None;
    remote.eta_minutes = None;
    let h = harness_with(vec![remote], CountingGeo::failing());
    let request = h.dispatcher.submit(submission("pet-zed")).expect("submits");
    let before = h.repository.fetch(&request.id).expect("fetch").expect("stored");

    match h.dispatcher.rank_candidates(&request.id).await {
        Err(error @ DispatchError::Upstream(UpstreamError::Geo(_))) => {
            assert_eq!(error.kind(), "upstream_unavailable");
            assert!(!error.user_message().contains("routing backend"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    let after = h.repository.fetch(&request.id).expect("fetch").expect("stored");
    assert_eq!(before, after);
}

#[tokio::test]
async fn geo_lookups_are_cached_per_location() {
    let mut first = provider("vet-a", 0.0, 4.0, 100);
    first.distance_km = None;
    first.eta_minutes = None;
    first.location = Some(GeoPoint::new(19.44, -99.14));
    let mut second = first.clone();
    second.provider_id = ProviderId::new("vet-b");

    let h = harness_with(vec![first, second], CountingGeo::default());
    let request = h.dispatcher.submit(submission("pet-ivy")).expect("submits");
    let ranked = h
        .dispatcher
        .rank_candidates(&request.id)
        .await
        .expect("ranks");

    assert_eq!(ranked.candidates.len(), 2);
    assert_eq!(h.geo.calls(), 1);
}

#[tokio::test]
async fn ranking_a_resolved_request_is_an_invalid_transition() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-fig")).expect("submits");
    h.dispatcher.cancel(&request.id, "").expect("cancels");

    match h.dispatcher.rank_candidates(&request.id).await {
        Err(DispatchError::InvalidTransition { current, .. }) => {
            assert_eq!(current, EmergencyStatus::Cancelled)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn cancel_records_reason_and_is_terminal() {
    let h = harness();
    let request = h.dispatcher.submit(submission("pet-nala")).expect("submits");

    let cancelled = h
        .dispatcher
        .cancel(&request.id, "  pet recovered  ")
        .expect("cancels");
    assert_eq!(cancelled.status, EmergencyStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("pet recovered"));

    let error = h
        .dispatcher
        .cancel(&request.id, "again")
        .expect_err("already terminal");
    assert_eq!(error.kind(), "invalid_transition");
    assert_eq!(error.user_message(), "This request was already cancelled.");

    let history = h.dispatcher.history(&request.id).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].note.as_deref(), Some("pet recovered"));
}

#[test]
fn unknown_request_is_not_found() {
    let h = harness();
    let missing = crate::dispatch::RequestId("emr-missing".to_string());
    assert!(matches!(
        h.dispatcher.describe(&missing),
        Err(DispatchError::NotFound(_))
    ));
    assert!(matches!(
        h.dispatcher.mark_attended(&missing),
        Err(DispatchError::NotFound(_))
    ));
}

#[test]
fn stale_requests_lists_idle_non_terminal_requests() {
    let h = harness();
    let idle = h.dispatcher.submit(submission("pet-old")).expect("submits");
    let closed = h.dispatcher.submit(submission("pet-closed")).expect("submits");
    h.dispatcher.cancel(&closed.id, "resolved").expect("cancels");

    h.clock.advance(Duration::minutes(45));
    let fresh = h.dispatcher.submit(submission("pet-new")).expect("submits");

    let stale = h.dispatcher.stale_requests().expect("lists");
    let ids: Vec<_> = stale.iter().map(|request| request.id.clone()).collect();
    assert_eq!(ids, vec![idle.id]);
    assert!(!ids.contains(&fresh.id));
}

#[test]
fn repository_outage_surfaces_as_upstream() {
    let dispatcher = EmergencyDispatcher::new(
        Arc::new(OfflineRepository),
        Arc::new(StaticDirectory::default()),
        Arc::new(CountingGeo::default()),
        &DispatchConfig::default(),
    );

    match dispatcher.submit(submission("pet-x")) {
        Err(DispatchError::Upstream(UpstreamError::Repository(RepositoryError::Unavailable(
            _,
        )))) => {}
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[test]
fn id_collision_is_not_reported_as_busy_pet() {
    let dispatcher = EmergencyDispatcher::new(
        Arc::new(CollidingRepository),
        Arc::new(StaticDirectory::default()),
        Arc::new(CountingGeo::default()),
        &DispatchConfig::default(),
    );

    match dispatcher.submit(submission("pet-lucky")) {
        Err(
            error @ DispatchError::Upstream(UpstreamError::Repository(
                RepositoryError::DuplicateId,
            )),
        ) => assert_eq!(error.kind(), "upstream_unavailable"),
        other => panic!("expected upstream id collision, got {other:?}"),
    }
}

#[tokio::test]
async fn stalled_directory_times_out_without_side_effects() {
    let repository = MemoryEmergencyRepository::default();
    let config = DispatchConfig {
        directory_timeout_ms: 20,
        ..DispatchConfig::default()
    };
    let dispatcher = EmergencyDispatcher::new(
        Arc::new(repository.clone()),
        Arc::new(StalledDirectory),
        Arc::new(CountingGeo::default()),
        &config,
    );
    let request = dispatcher.submit(submission("pet-echo")).expect("submits");

    match dispatcher.rank_candidates(&request.id).await {
        Err(error @ DispatchError::Upstream(UpstreamError::DirectoryTimeout(20))) => {
            assert_eq!(error.kind(), "upstream_unavailable");
        }
        other => panic!("expected directory timeout, got {other:?}"),
    }
    let stored = repository.fetch(&request.id).expect("fetch").expect("stored");
    assert_eq!(stored.version, 0);
    assert!(stored.offered_providers.is_none());
}

#[test]
fn out_of_range_stale_window_is_clamped() {
    let clock = Arc::new(FixedClock::new());
    let build = |minutes: i64| {
        EmergencyDispatcher::with_clock(
            Arc::new(MemoryEmergencyRepository::default()),
            Arc::new(StaticDirectory::default()),
            Arc::new(CountingGeo::default()),
            &DispatchConfig {
                stale_after_minutes: minutes,
                ..DispatchConfig::default()
            },
            clock.clone(),
        )
    };
    let huge = build(i64::MAX);
    let negative = build(-5);
    huge.submit(submission("pet-huge")).expect("submits");
    let idle = negative.submit(submission("pet-neg")).expect("submits");

    clock.advance(Duration::minutes(2));

    assert!(huge.stale_requests().expect("lists").is_empty());
    let stale = negative.stale_requests().expect("lists");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, idle.id);
}

#[test]
fn concurrent_assignments_have_a_single_winner() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    for round in 0..20 {
        let h = harness();
        let request = h
            .dispatcher
            .submit(submission(&format!("pet-race-{round}")))
            .expect("submits");
        runtime
            .block_on(h.dispatcher.rank_candidates(&request.id))
            .expect("ranks");

        let barrier = std::sync::Barrier::new(2);
        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["vet-best", "vet-good"]
                .into_iter()
                .map(|provider_id| {
                    let dispatcher = &h.dispatcher;
                    let barrier = &barrier;
                    let request_id = &request.id;
                    scope.spawn(move || {
                        barrier.wait();
                        dispatcher.assign(request_id, &ProviderId::new(provider_id))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .collect()
        });

        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(winners, 1, "round {round}: {outcomes:?}");
        let loser = outcomes
            .iter()
            .find_map(|outcome| outcome.as_ref().err())
            .expect("one loser");
        assert!(
            matches!(
                loser,
                DispatchError::InvalidTransition {
                    current: EmergencyStatus::Assigned,
                    ..
                }
            ),
            "round {round}: {loser:?}"
        );

        let history = h.dispatcher.history(&request.id).expect("history");
        assert_eq!(history.len(), 2, "exactly one assignment recorded");
    }
}

// Integration tests for Matching Core

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use matching_core::config::{MatchingSettings, RuntimeMode};
use matching_core::core::{ExpirySweeper, Matcher};
use matching_core::models::{
    CreateMatchingRequest, EntityRef, EntityType, GeoPoint, Match, MatchMetadata, MatchStatus,
    MatchingFilters, MatchingRequest, MatchingResults, RequestStatus, StrategyKind, StrategySettings,
};
use matching_core::routes::{self, AppState};
use async_trait::async_trait;
use matching_core::services::{CacheManager, CandidateQuery, GeoSearch, MemoryStore, RecordStore, StoreError};
use matching_core::MatchingError;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

const SEOUL: GeoPoint = GeoPoint(37.5665, 126.9780);

struct Harness {
    store: Arc<MemoryStore>,
    cache: Arc<CacheManager>,
    matcher: Matcher,
}

fn harness(mode: RuntimeMode) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(CacheManager::local(1_000, 300));
    let settings = MatchingSettings {
        environment: mode,
        ..MatchingSettings::default()
    };
    let matcher = Matcher::new(store.clone(), store.clone(), cache.clone(), &settings);

    Harness { store, cache, matcher }
}

async fn seed_users(store: &MemoryStore) {
    for record in [
        json!({ "id": "u1", "display_name": "Requester", "location": [37.5665, 126.9780], "categories": ["sports"] }),
        // About 100m north
        json!({ "id": "u2", "display_name": "Neighbour", "location": { "type": "Point", "coordinates": [126.9780, 37.5674] }, "categories": ["sports"] }),
        // About 1.5km north, different interests
        json!({ "id": "u3", "display_name": "Musician", "location": [37.5800, 126.9780], "categories": ["music"] }),
    ] {
        assert_ok!(store.insert_entity(EntityType::User, record).await);
    }
}

/// Radius search that never answers
struct StalledSearch;

#[async_trait]
impl GeoSearch for StalledSearch {
    async fn search_nearby(&self, _query: &CandidateQuery) -> Result<Vec<Value>, StoreError> {
        futures::future::pending().await
    }
}

fn payload(strategy: StrategyKind) -> CreateMatchingRequest {
    CreateMatchingRequest {
        requester_id: Some("u1".to_string()),
        requester_type: EntityType::User,
        target_type: EntityType::User,
        strategy: Some(strategy),
        filters: MatchingFilters {
            location: Some(SEOUL),
            radius: Some(5_000.0),
            categories: None,
        },
        settings: None,
    }
}

/// Poll until background processing leaves `active`
async fn wait_for_results(matcher: &Matcher, request_id: Uuid) -> MatchingResults {
    for _ in 0..200 {
        let results = matcher.get_results(request_id).await.unwrap();
        if results.status != RequestStatus::Active {
            return results;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("request {} never finished processing", request_id);
}

fn stored_match(request_id: Uuid, status: MatchStatus, expires_at: chrono::DateTime<Utc>) -> Match {
    Match {
        id: Uuid::new_v4(),
        request_id,
        entity_a: EntityRef { id: "u1".to_string(), entity_type: EntityType::User },
        entity_b: EntityRef { id: "u2".to_string(), entity_type: EntityType::User },
        score: 80.0,
        status,
        metadata: MatchMetadata::default(),
        resolved_by: None,
        resolved_at: None,
        created_at: expires_at - Duration::hours(24),
        expires_at,
    }
}

#[tokio::test]
async fn test_integration_hybrid_round_trip() {
    let h = harness(RuntimeMode::Production);
    seed_users(&h.store).await;

    let mut request = payload(StrategyKind::Hybrid);
    request.filters.categories = Some(vec!["sports".to_string()]);

    let created = h.matcher.create_request(request, None).await.unwrap();
    assert_eq!(created.status, RequestStatus::Active);
    assert_eq!(created.settings, StrategySettings::default());

    let results = wait_for_results(&h.matcher, created.id).await;
    assert_eq!(results.status, RequestStatus::Completed);
    assert_eq!(results.results.len(), 1);

    let top = &results.results[0];
    assert_eq!(top.score, 95.8);
    assert_eq!(top.status, MatchStatus::Proposed);
    assert_eq!(top.entity_a.name.as_deref(), Some("Requester"));
    assert_eq!(top.entity_b.id, "u2");
    assert_eq!(top.entity_b.name.as_deref(), Some("Neighbour"));
    assert!(top.expires_at > top.created_at);

    let explanation = top.metadata.explanation.as_deref().unwrap();
    assert!(explanation.contains("sports"));
    assert!(explanation.contains("km"));
}

#[tokio::test]
async fn test_results_are_ranked_and_persisted() {
    let h = harness(RuntimeMode::Production);
    seed_users(&h.store).await;

    let created = h.matcher.create_request(payload(StrategyKind::Distance), None).await.unwrap();
    let results = wait_for_results(&h.matcher, created.id).await;

    let ids: Vec<&str> = results.results.iter().map(|r| r.entity_b.id.as_str()).collect();
    assert_eq!(ids, vec!["u2", "u3"]);
    assert!(results.results[0].score > results.results[1].score);

    let stored = h.store.matches_for_request(created.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|m| m.entity_a.id == "u1"));
}

#[tokio::test]
async fn test_accept_and_reject_are_idempotent() {
    let h = harness(RuntimeMode::Production);
    seed_users(&h.store).await;

    let created = h.matcher.create_request(payload(StrategyKind::Distance), None).await.unwrap();
    let results = wait_for_results(&h.matcher, created.id).await;
    let first = results.results[0].id;
    let second = results.results[1].id;

    let accepted = h.matcher.accept_match(first, "u1").await.unwrap();
    assert_eq!(accepted.status, MatchStatus::Accepted);
    assert_eq!(accepted.resolved_by.as_deref(), Some("u1"));

    let again = h.matcher.accept_match(first, "u1").await.unwrap();
    assert_eq!(again.status, MatchStatus::Accepted);
    assert_eq!(again.resolved_at, accepted.resolved_at);

    // A terminal match does not change state
    let late_reject = h.matcher.reject_match(first, "u2").await.unwrap();
    assert_eq!(late_reject.status, MatchStatus::Accepted);

    let rejected = h.matcher.reject_match(second, "u1").await.unwrap();
    assert_eq!(h.matcher.reject_match(second, "u1").await.unwrap().status, rejected.status);

    // Cached results were dropped, so polling sees the new statuses
    let refreshed = h.matcher.get_results(created.id).await.unwrap();
    let status_of = |id: Uuid| refreshed.results.iter().find(|r| r.id == id).map(|r| r.status);
    assert_eq!(status_of(first), Some(MatchStatus::Accepted));
    assert_eq!(status_of(second), Some(MatchStatus::Rejected));
}

#[tokio::test]
async fn test_rejected_candidates_are_excluded_from_later_searches() {
    let h = harness(RuntimeMode::Production);
    seed_users(&h.store).await;

    let first = h.matcher.create_request(payload(StrategyKind::Distance), None).await.unwrap();
    let results = wait_for_results(&h.matcher, first.id).await;
    let neighbour = results.results.iter().find(|r| r.entity_b.id == "u2").unwrap();
    assert_ok!(h.matcher.reject_match(neighbour.id, "u1").await);

    let second = h.matcher.create_request(payload(StrategyKind::Distance), None).await.unwrap();
    let results = wait_for_results(&h.matcher, second.id).await;
    let ids: Vec<&str> = results.results.iter().map(|r| r.entity_b.id.as_str()).collect();
    assert_eq!(ids, vec!["u3"]);

    let mut lenient = payload(StrategyKind::Distance);
    lenient.settings = Some(StrategySettings {
        enable_negative_filter: false,
        ..StrategySettings::default()
    });
    let third = h.matcher.create_request(lenient, None).await.unwrap();
    let results = wait_for_results(&h.matcher, third.id).await;
    assert_eq!(results.results.len(), 2);
}

#[tokio::test]
async fn test_active_request_without_matches_reports_active() {
    let h = harness(RuntimeMode::Production);
    let request = MatchingRequest {
        id: Uuid::new_v4(),
        requester_id: "u1".to_string(),
        requester_type: EntityType::User,
        target_type: EntityType::Team,
        strategy: StrategyKind::Hybrid,
        filters: MatchingFilters::default(),
        settings: StrategySettings::default(),
        status: RequestStatus::Active,
        created_at: Utc::now(),
    };
    assert_ok!(h.store.insert_request(&request).await);

    let results = h.matcher.get_results(request.id).await.unwrap();
    assert_eq!(results.status, RequestStatus::Active);
    assert!(results.results.is_empty());
}

#[tokio::test]
async fn test_unknown_request_is_not_found() {
    let h = harness(RuntimeMode::Production);
    let result = h.matcher.get_results(Uuid::new_v4()).await;
    assert!(matches!(result, Err(MatchingError::NotFound(_))));
}

#[tokio::test]
async fn test_sweeper_expires_only_stale_proposals() {
    let h = harness(RuntimeMode::Production);
    let now = Utc::now();
    let request_id = Uuid::new_v4();

    let stale = stored_match(request_id, MatchStatus::Proposed, now - Duration::minutes(5));
    let fresh = stored_match(request_id, MatchStatus::Proposed, now + Duration::hours(3));
    let accepted = stored_match(request_id, MatchStatus::Accepted, now - Duration::minutes(5));
    for record in [&stale, &fresh, &accepted] {
        h.store.put_match(record.clone()).await;
    }

    let sweeper = ExpirySweeper::new(h.store.clone(), h.cache.clone());
    assert_eq!(sweeper.run_once(now).await.unwrap(), 1);

    assert_eq!(h.store.get_match(stale.id).await.unwrap().status, MatchStatus::Expired);
    assert_eq!(h.store.get_match(fresh.id).await.unwrap().status, MatchStatus::Proposed);
    assert_eq!(h.store.get_match(accepted.id).await.unwrap().status, MatchStatus::Accepted);

    // Expired matches can no longer be accepted
    let late = h.matcher.accept_match(stale.id, "u1").await.unwrap();
    assert_eq!(late.status, MatchStatus::Expired);
}

#[tokio::test]
async fn test_production_fails_when_store_is_down() {
    let h = harness(RuntimeMode::Production);
    h.store.set_offline(true);

    let result = h.matcher.create_request(payload(StrategyKind::Hybrid), None).await;
    assert!(matches!(result, Err(MatchingError::Store(_))));

    assert_err!(h.matcher.accept_match(Uuid::new_v4(), "u1").await);
}

#[tokio::test]
async fn test_development_completes_without_store() {
    let h = harness(RuntimeMode::Development);
    h.store.set_offline(true);

    let created = h.matcher.create_request(payload(StrategyKind::Hybrid), None).await.unwrap();
    assert_eq!(created.requester_id, "u1");

    let results = wait_for_results(&h.matcher, created.id).await;
    assert_eq!(results.status, RequestStatus::Completed);
    assert_eq!(results.results.len(), 5);
    assert!(results.results.iter().all(|r| r.entity_b.id.starts_with("candidate-")));
    assert!(results.results.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn test_failed_processing_is_recorded() {
    let h = harness(RuntimeMode::Production);
    // Requester u1 does not exist
    let created = h.matcher.create_request(payload(StrategyKind::Hybrid), None).await.unwrap();

    let results = wait_for_results(&h.matcher, created.id).await;
    assert_eq!(results.status, RequestStatus::Failed);
    assert!(results.results.is_empty());
}

#[tokio::test]
async fn test_processing_past_deadline_is_marked_failed() {
    let store = Arc::new(MemoryStore::new());
    seed_users(&store).await;
    let settings = MatchingSettings {
        environment: RuntimeMode::Production,
        processing_timeout_secs: 1,
        ..MatchingSettings::default()
    };
    let matcher = Matcher::new(
        store.clone(),
        Arc::new(StalledSearch),
        Arc::new(CacheManager::local(100, 300)),
        &settings,
    );

    let created = matcher.create_request(payload(StrategyKind::Hybrid), None).await.unwrap();
    assert_eq!(matcher.get_results(created.id).await.unwrap().status, RequestStatus::Active);

    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;

    let results = matcher.get_results(created.id).await.unwrap();
    assert_eq!(results.status, RequestStatus::Failed);
    assert!(results.results.is_empty());
    assert!(store.matches_for_request(created.id).await.unwrap().is_empty());
}

#[actix_web::test]
async fn test_http_create_and_poll() {
    let h = harness(RuntimeMode::Production);
    seed_users(&h.store).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState { matcher: h.matcher.clone() }))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/matching/request")
        .insert_header(("X-Actor-Id", "u1"))
        .set_json(json!({
            "requesterType": "user",
            "targetType": "user",
            "strategy": "distance",
            "filters": { "location": [37.5665, 126.9780], "radius": 5000 }
        }))
        .to_request();
    let created: MatchingRequest = test::call_and_read_body_json(&app, req).await;
    assert_eq!(created.requester_id, "u1");
    assert_eq!(created.strategy, StrategyKind::Distance);

    wait_for_results(&h.matcher, created.id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/matching/results/{}", created.id))
        .to_request();
    let results: MatchingResults = test::call_and_read_body_json(&app, req).await;
    assert_eq!(results.status, RequestStatus::Completed);
    assert_eq!(results.results.len(), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/matching/{}/accept", results.results[0].id))
        .set_json(json!({ "actorId": "u1" }))
        .to_request();
    let accepted: Match = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted.status, MatchStatus::Accepted);
}

#[actix_web::test]
async fn test_http_error_statuses() {
    let h = harness(RuntimeMode::Production);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState { matcher: h.matcher.clone() }))
            .configure(routes::configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/matching/results/not-a-uuid").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/matching/results/{}", Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // No actor in body or header
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/matching/{}/reject", Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/matching/request")
        .set_json(json!({
            "requesterId": "u1",
            "requesterType": "user",
            "targetType": "team",
            "settings": { "distanceWeight": 0.9, "preferenceWeight": 0.9 }
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

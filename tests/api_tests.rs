// HTTP surface tests, wired to the in-memory store

use actix_web::{http::StatusCode, test, web, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use circle_match::core::{
    CandidateSelector, Clock, CompatibilityScorer, ConnectionGraphQuery,
    ConnectionRequestWorkflow, DiscoverySettings, ManualClock, QuotaLimits, RateWindowStrategy,
    SubscriptionEntitlementResolver, SwipeWindowCounter, TierPolicy,
};
use circle_match::models::{ScoringWeights, SubscriptionGrant, SubscriptionStatus, UserProfile};
use circle_match::routes::{configure_routes, AppState};
use circle_match::services::{LogNotifier, MemoryStore};

fn app_state(store: Arc<MemoryStore>) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let resolver = Arc::new(SubscriptionEntitlementResolver::new(
        store.clone(),
        TierPolicy::default(),
        clock.clone(),
    ));
    let swipes = Arc::new(SwipeWindowCounter::new(
        store.clone(),
        resolver.clone(),
        RateWindowStrategy::default(),
        QuotaLimits::default(),
        clock.clone(),
    ));
    let graph = Arc::new(ConnectionGraphQuery::new(store.clone(), store.clone()));
    let selector = CandidateSelector::new(
        store.clone(),
        graph.clone(),
        swipes.clone(),
        resolver.clone(),
        CompatibilityScorer::new(ScoringWeights::default()),
        DiscoverySettings::default(),
        clock.clone(),
    )
    .with_seed(9);
    let workflow = Arc::new(ConnectionRequestWorkflow::new(
        store,
        graph.clone(),
        swipes.clone(),
        Arc::new(LogNotifier),
        clock,
    ));

    AppState {
        entitlements: resolver,
        swipes,
        graph,
        selector,
        workflow,
        database: None,
    }
}

fn swipe_body(user_id: i64, target_user_id: i64) -> Value {
    json!({
        "userId": user_id,
        "targetUserId": target_user_id,
        "requestType": "right_swipe",
    })
}

#[actix_web::test]
async fn test_health() {
    let state = app_state(Arc::new(MemoryStore::new()));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/health").to_request(),
    )
    .await;
    assert_eq!(resp["status"], "healthy");
}

#[actix_web::test]
async fn test_swipe_lifecycle_over_http() {
    let state = app_state(Arc::new(MemoryStore::new()));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/swipe")
        .set_json(swipe_body(1, 2))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let request_id = created["request_id"].as_i64().unwrap();

    // reverse direction is a duplicate
    let req = test::TestRequest::post()
        .uri("/api/v1/connections/swipe")
        .set_json(swipe_body(2, 1))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "duplicate");
    assert_eq!(body["request_id"], request_id);
    assert_eq!(body["status"], "pending");

    let req = test::TestRequest::get()
        .uri("/api/v1/connections/pending?userId=2")
        .to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pending["total_results"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/connections/{}/accept", request_id))
        .set_json(json!({ "userId": 99 }))
        .to_request();
    let wrong_actor: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(wrong_actor["success"], false);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/connections/{}/accept", request_id))
        .set_json(json!({ "userId": 2 }))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted["success"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/disconnect")
        .set_json(json!({ "userId": 1, "otherUserId": 2 }))
        .to_request();
    let disconnected: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(disconnected["success"], true);

    let req = test::TestRequest::get()
        .uri("/api/v1/connections/swipe-stats?userId=1")
        .to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["total_swipes"], 1);
    assert_eq!(stats["remaining_swipes"], 49);
    assert_eq!(stats["swipe_limit"], 50);
}

#[actix_web::test]
async fn test_self_swipe_and_validation_errors() {
    let state = app_state(Arc::new(MemoryStore::new()));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/swipe")
        .set_json(swipe_body(5, 5))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "self_request");

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/swipe")
        .set_json(swipe_body(0, 5))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_quota_exhaustion_returns_429() {
    let store = Arc::new(MemoryStore::new());
    let state = app_state(store);
    for _ in 0..50 {
        state
            .swipes
            .record_swipe(1, circle_match::models::SwipeDirection::Left)
            .await
            .unwrap();
    }
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/swipe")
        .set_json(swipe_body(1, 2))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["swipe_limit"], 50);
    assert_eq!(body["remaining_swipes"], 0);
    assert!(body["resets_at"].is_string());
}

#[actix_web::test]
async fn test_discover_modes() {
    let store = Arc::new(MemoryStore::new());
    for id in 11..=30 {
        store
            .insert_profile(UserProfile {
                user_id: id,
                name: format!("User {}", id),
                gender: None,
                birth_date: None,
                country_id: Some(if id % 2 == 0 { 1 } else { 2 }),
                interests: vec![],
                social_circle_ids: vec![3],
                is_active: true,
                is_deleted: false,
                created_at: Utc::now(),
            })
            .await;
    }
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(store)))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/discover?userId=1&countryId=1&limit=50")
        .to_request();
    let random: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(random["total_results"], 10);

    let req = test::TestRequest::get()
        .uri("/api/v1/discover?userId=1&socialCircleIds=3,4&limit=5&mode=latest")
        .to_request();
    let latest: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(latest["total_results"], 5);

    let req = test::TestRequest::get()
        .uri("/api/v1/discover?userId=1&limit=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_entitlement_refresh_reports_new_plan() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_grant(SubscriptionGrant {
            user_id: 7,
            plan_id: 2,
            status: SubscriptionStatus::Active,
            expires_at: Utc::now() + Duration::days(30),
        })
        .await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(store)))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/entitlements/7/refresh")
        .to_request();
    let refreshed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(refreshed["user_id"], 7);
    assert_eq!(refreshed["tier_ids"], json!([2]));
    assert_eq!(refreshed["boost"], true);
    assert_eq!(refreshed["unlimited"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/connections/swipe-stats?userId=7")
        .to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["swipe_limit"], 100);
    assert_eq!(stats["has_boost"], true);
}

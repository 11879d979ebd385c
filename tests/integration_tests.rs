// Integration tests for circle-match, run against the in-memory store

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use circle_match::core::{
    CandidateSelector, Clock, CompatibilityScorer, ConnectionGraphQuery,
    ConnectionRequestWorkflow, DiscoverySettings, ExclusionPolicy, ManualClock, QuotaLimits,
    RateWindowStrategy, SubscriptionEntitlementResolver, SwipeWindowCounter, TierPolicy,
};
use circle_match::error::EngineError;
use circle_match::models::{
    DiscoverFilters, RequestStatus, RequestType, ScoringWeights, SubscriptionGrant,
    SubscriptionStatus, SwipeDirection, UserId, UserProfile,
};
use circle_match::services::{LogNotifier, LookupKind, MemoryStore};

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    swipes: Arc<SwipeWindowCounter>,
    graph: Arc<ConnectionGraphQuery>,
    selector: CandidateSelector,
    workflow: ConnectionRequestWorkflow,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn harness() -> Harness {
    harness_with(RateWindowStrategy::default())
}

fn harness_with(strategy: RateWindowStrategy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let resolver = Arc::new(SubscriptionEntitlementResolver::new(
        store.clone(),
        TierPolicy::default(),
        dyn_clock.clone(),
    ));
    let swipes = Arc::new(SwipeWindowCounter::new(
        store.clone(),
        resolver.clone(),
        strategy,
        QuotaLimits::default(),
        dyn_clock.clone(),
    ));
    let graph = Arc::new(ConnectionGraphQuery::new(store.clone(), store.clone()));
    let selector = CandidateSelector::new(
        store.clone(),
        graph.clone(),
        swipes.clone(),
        resolver,
        CompatibilityScorer::new(ScoringWeights::default()),
        DiscoverySettings::default(),
        dyn_clock.clone(),
    )
    .with_seed(42);
    let workflow = ConnectionRequestWorkflow::new(
        store.clone(),
        graph.clone(),
        swipes.clone(),
        Arc::new(LogNotifier),
        dyn_clock,
    );

    Harness {
        store,
        clock,
        swipes,
        graph,
        selector,
        workflow,
    }
}

fn create_test_profile(user_id: UserId, circles: Vec<i64>) -> UserProfile {
    UserProfile {
        user_id,
        name: format!("User {}", user_id),
        gender: None,
        birth_date: None,
        country_id: Some(1),
        interests: vec![],
        social_circle_ids: circles,
        is_active: true,
        is_deleted: false,
        created_at: start() - Duration::minutes(user_id),
    }
}

async fn seed_profiles(store: &MemoryStore, ids: impl IntoIterator<Item = UserId>) {
    for id in ids {
        store.insert_profile(create_test_profile(id, vec![1])).await;
    }
}

async fn grant(store: &MemoryStore, user_id: UserId, plan_id: i64) {
    store
        .insert_grant(SubscriptionGrant {
            user_id,
            plan_id,
            status: SubscriptionStatus::Active,
            expires_at: start() + Duration::days(30),
        })
        .await;
}

#[tokio::test]
async fn test_free_user_runs_out_after_fifty_swipes() {
    let h = harness();

    assert_eq!(h.swipes.quota(1).await.unwrap(), 50);
    assert!(h.swipes.can_swipe(1).await.unwrap());

    let mut previous = h.swipes.remaining(1).await.unwrap();
    for _ in 0..50 {
        assert_ok!(h.swipes.record_swipe(1, SwipeDirection::Right).await);
        let remaining = h.swipes.remaining(1).await.unwrap();
        assert_eq!(remaining, previous - 1);
        previous = remaining;
    }

    assert!(!h.swipes.can_swipe(1).await.unwrap());
    assert_eq!(h.swipes.remaining(1).await.unwrap(), 0);

    let err = assert_err!(h.swipes.ensure_can_swipe(1).await);
    match err {
        EngineError::QuotaExceeded { limit, resets_at } => {
            assert_eq!(limit, 50);
            assert_eq!(resets_at, Some(start() + Duration::hours(12)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tier_quotas() {
    let h = harness();
    grant(&h.store, 2, 2).await;
    grant(&h.store, 3, 6).await;
    grant(&h.store, 3, 5).await;

    assert_eq!(h.swipes.quota(1).await.unwrap(), 50);
    assert_eq!(h.swipes.quota(2).await.unwrap(), 100);
    assert_eq!(h.swipes.quota(3).await.unwrap(), 999_999);

    let stats = h.swipes.stats(2).await.unwrap();
    assert!(stats.has_boost);
    assert_eq!(stats.swipe_limit, 100);
    assert_eq!(stats.remaining_swipes, 100);
    assert_eq!(stats.resets_at, None);
}

#[tokio::test]
async fn test_expired_grant_falls_back_to_free_quota() {
    let h = harness();
    h.store
        .insert_grant(SubscriptionGrant {
            user_id: 1,
            plan_id: 2,
            status: SubscriptionStatus::Active,
            expires_at: start() + Duration::hours(1),
        })
        .await;

    assert_eq!(h.swipes.quota(1).await.unwrap(), 100);
    h.clock.advance(Duration::hours(2));
    assert_eq!(h.swipes.quota(1).await.unwrap(), 50);
}

#[tokio::test]
async fn test_window_boundary_is_exclusive() {
    let h = harness();
    assert_ok!(h.swipes.record_swipe(1, SwipeDirection::Left).await);

    h.clock.set(start() + Duration::hours(12) - Duration::seconds(1));
    assert_eq!(h.swipes.usage(1).await.unwrap().total, 1);

    h.clock.set(start() + Duration::hours(12));
    assert_eq!(h.swipes.usage(1).await.unwrap().total, 0);
    assert_eq!(h.swipes.remaining(1).await.unwrap(), 50);

    // the daily counter still remembers it
    let day = start().date_naive();
    assert_eq!(h.swipes.daily_usage(1, day).await.unwrap().left, 1);
}

#[tokio::test]
async fn test_seeded_history_at_the_boundary() {
    let h = harness();
    let boundary = start() - Duration::hours(12);
    h.store.insert_swipe_at(1, SwipeDirection::Right, boundary).await;
    h.store
        .insert_swipe_at(1, SwipeDirection::Right, boundary + Duration::milliseconds(1))
        .await;
    h.store
        .insert_swipe_at(1, SwipeDirection::Left, start() - Duration::hours(1))
        .await;

    let usage = h.swipes.usage(1).await.unwrap();
    assert_eq!(usage.total, 2);
    assert_eq!(usage.left, 1);
    assert_eq!(h.swipes.usage_in_window(1, 24).await.unwrap().total, 3);
    assert_eq!(
        h.swipes.resets_at(1).await.unwrap(),
        Some(start() + Duration::milliseconds(1))
    );
}

#[tokio::test]
async fn test_calendar_day_window_resets_at_midnight() {
    let h = harness_with(RateWindowStrategy::CalendarDay);
    for _ in 0..3 {
        assert_ok!(h.swipes.record_swipe(1, SwipeDirection::Super).await);
    }

    let stats = h.swipes.stats(1).await.unwrap();
    assert_eq!(stats.total_swipes, 3);
    assert_eq!(stats.super_likes, 3);
    assert_eq!(
        stats.resets_at,
        Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap())
    );

    h.clock.set(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    assert_eq!(h.swipes.usage(1).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_duplicate_requests_in_both_directions() {
    let h = harness();

    let first = assert_ok!(
        h.workflow
            .send_request(1, 2, Some(1), RequestType::RightSwipe, None)
            .await
    );

    for (sender, receiver) in [(1, 2), (2, 1)] {
        let err = assert_err!(
            h.workflow
                .send_request(sender, receiver, None, RequestType::RightSwipe, None)
                .await
        );
        match err {
            EngineError::DuplicateRequest { request_id, status } => {
                assert_eq!(request_id, first);
                assert_eq!(status, RequestStatus::Pending);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(h.store.request_count().await, 1);
    // rejected duplicates must not consume quota
    assert_eq!(h.swipes.remaining(2).await.unwrap(), 50);
    assert_eq!(h.swipes.remaining(1).await.unwrap(), 49);
}

#[tokio::test]
async fn test_send_blocked_by_quota() {
    let h = harness();
    for _ in 0..50 {
        h.swipes.record_swipe(1, SwipeDirection::Left).await.unwrap();
    }

    let err = assert_err!(
        h.workflow
            .send_request(1, 2, None, RequestType::LeftSwipe, None)
            .await
    );
    assert!(matches!(err, EngineError::QuotaExceeded { limit: 50, .. }));
    assert_eq!(h.store.request_count().await, 0);
}

#[tokio::test]
async fn test_accept_requires_receiver() {
    let h = harness();
    let id = h
        .workflow
        .send_request(7, 42, None, RequestType::RightSwipe, None)
        .await
        .unwrap();

    assert!(!h.workflow.accept(id, 99).await.unwrap());
    assert!(!h.workflow.accept(id, 7).await.unwrap());
    assert!(!h.graph.are_connected(7, 42).await.unwrap());

    assert!(h.workflow.accept(id, 42).await.unwrap());
    assert!(h.graph.are_connected(42, 7).await.unwrap());
    assert_eq!(h.graph.connection_count(7).await.unwrap(), 1);
    assert_eq!(
        h.graph.connected_user_ids(7).await.unwrap(),
        HashSet::from([42])
    );

    // no second accept once resolved
    assert!(!h.workflow.accept(id, 42).await.unwrap());
    assert!(!h.workflow.accept(9_999, 42).await.unwrap());
}

#[tokio::test]
async fn test_pending_requests_newest_first() {
    let h = harness();
    let older = h
        .workflow
        .send_request(3, 1, None, RequestType::RightSwipe, None)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(5));
    let newer = h
        .workflow
        .send_request(4, 1, None, RequestType::SuperLike, None)
        .await
        .unwrap();

    let pending = h.graph.pending_requests_for(1).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer, older]);

    h.workflow.reject(older, 1).await.unwrap();
    assert_eq!(h.graph.pending_requests_for(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_discovery_never_returns_excluded_users() {
    let h = harness();
    seed_profiles(&h.store, 1..=40).await;

    // swiped in both directions, blocked in both directions
    h.workflow
        .send_request(1, 12, None, RequestType::RightSwipe, None)
        .await
        .unwrap();
    h.workflow
        .send_request(13, 1, None, RequestType::RightSwipe, None)
        .await
        .unwrap();
    h.store.insert_block(1, 14).await;
    h.store.insert_block(15, 1).await;

    let excluded: HashSet<UserId> = HashSet::from([1, 12, 13, 14, 15]);
    let filters = DiscoverFilters::default();

    for _ in 0..5 {
        let random = h.selector.discover(1, &filters, 50).await.unwrap();
        assert!(!random.is_empty());
        assert!(random.iter().all(|p| !excluded.contains(&p.user_id)));

        let latest = h
            .selector
            .discover_latest_with_boost_priority(1, &filters, 10)
            .await
            .unwrap();
        assert_eq!(latest.len(), 10);
        assert!(latest.iter().all(|p| !excluded.contains(&p.user_id) && p.user_id > 10));

        let single = h.selector.random_any(1, &[16]).await.unwrap().unwrap();
        assert!(!excluded.contains(&single.user_id) && single.user_id != 16);

        let member = h
            .selector
            .random_from_social_circle(1, 1, &[])
            .await
            .unwrap()
            .unwrap();
        assert!(!excluded.contains(&member.user_id));
    }

    let recommended = h.selector.recommendations_by_compatibility(1, 100).await.unwrap();
    assert!(recommended.iter().all(|c| !excluded.contains(&c.profile.user_id)));
}

#[tokio::test]
async fn test_random_discovery_reaches_whole_eligible_pool() {
    let h = harness();
    let pool_size = DiscoverySettings::default().pool_size as UserId;
    seed_profiles(&h.store, 2..=600).await;

    let mut seen: HashSet<UserId> = HashSet::new();
    let mut picked: HashSet<UserId> = HashSet::new();
    for seed in 0..50 {
        let selector = h.selector.clone().with_seed(seed);
        let batch = selector
            .discover(1, &DiscoverFilters::default(), 20)
            .await
            .unwrap();
        assert_eq!(batch.len(), 20);
        seen.extend(batch.iter().map(|p| p.user_id));

        if let Some(profile) = selector.random_any(1, &[]).await.unwrap() {
            picked.insert(profile.user_id);
        }
    }

    assert!(seen.iter().any(|id| *id > pool_size + 1));
    assert!(picked.iter().any(|id| *id > pool_size + 10));
}

#[tokio::test]
async fn test_blocked_lookup_failure_fails_closed_by_default() {
    let h = harness();
    seed_profiles(&h.store, 11..=20).await;
    h.store.fail_lookups(LookupKind::Blocked, true);

    let result = h.selector.discover(1, &DiscoverFilters::default(), 5).await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));

    let lenient = h.selector.with_policy(ExclusionPolicy::fail_open());
    let candidates = lenient.discover(1, &DiscoverFilters::default(), 5).await.unwrap();
    assert_eq!(candidates.len(), 5);
}

#[tokio::test]
async fn test_swiped_lookup_failure_fails_open() {
    let h = harness();
    seed_profiles(&h.store, 11..=20).await;
    h.store.fail_lookups(LookupKind::Swiped, true);

    let candidates = h
        .selector
        .discover(1, &DiscoverFilters::default(), 20)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 10);
}

#[tokio::test]
async fn test_boosted_users_take_the_front_slots() {
    let h = harness();
    seed_profiles(&h.store, 11..=33).await;
    let boosted: HashSet<UserId> = HashSet::from([14, 22, 30]);
    for id in &boosted {
        grant(&h.store, *id, 5).await;
    }

    let ranked = h
        .selector
        .discover_latest_with_boost_priority(1, &DiscoverFilters::default(), 10)
        .await
        .unwrap();

    assert_eq!(ranked.len(), 10);
    let front: HashSet<UserId> = ranked[..3].iter().map(|p| p.user_id).collect();
    assert_eq!(front, boosted);
    assert!(ranked[3..].iter().all(|p| !boosted.contains(&p.user_id)));
}

#[tokio::test]
async fn test_exhausted_quota_hides_discovery() {
    let h = harness();
    seed_profiles(&h.store, 11..=20).await;
    for _ in 0..50 {
        h.swipes.record_swipe(1, SwipeDirection::Right).await.unwrap();
    }

    let filters = DiscoverFilters::default();
    assert!(h.selector.discover(1, &filters, 5).await.unwrap().is_empty());
    assert!(h.selector.random_any(1, &[]).await.unwrap().is_none());

    // window rolls over
    h.clock.advance(Duration::hours(12));
    assert_eq!(h.selector.discover(1, &filters, 5).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_recommendations_rank_by_compatibility() {
    let h = harness();
    h.store.insert_profile(create_test_profile(1, vec![1, 2])).await;
    h.store.insert_profile(create_test_profile(20, vec![1, 2])).await;
    h.store.insert_profile(create_test_profile(21, vec![1])).await;
    h.store.insert_profile(create_test_profile(22, vec![2, 9])).await;
    h.store.insert_profile(create_test_profile(23, vec![9])).await;

    let recommended = h.selector.recommendations_by_compatibility(1, 10).await.unwrap();
    let ids: Vec<UserId> = recommended.iter().map(|c| c.profile.user_id).collect();

    // 23 shares no circle with the requester
    assert_eq!(ids, vec![20, 21, 22]);
    assert!(recommended.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(recommended.iter().all(|c| (0.0..=1.0).contains(&c.score)));

    assert!(h.selector.recommendations_by_compatibility(999, 10).await.unwrap().is_empty());
}

//! In-memory store for tests and local development.
//!
//! All data sits behind one `RwLock`; every mutating call takes the write lock
//! once, which gives the same all-or-nothing behaviour as the Postgres
//! transactions. Not suitable for multi-instance deployments.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::core::filters::matches_query_constraints;
use crate::models::{
    BlockRelation, CandidateOrder, CandidateQuery, ConnectionRequest, NewConnectionRequest,
    RequestId, RequestStatus, StatusUpdate, SubscriptionGrant, SwipeAllowance, SwipeDirection,
    SwipeEvent, SwipeUsage, UsageWindow, UserId, UserProfile,
};
use crate::services::store::{
    BlockStore, ConnectionStore, ProfileStore, StoreError, SubscriptionStore, SwipeStore,
};

/// Lookups that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Swiped,
    Blocked,
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: BTreeMap<UserId, UserProfile>,
    grants: Vec<SubscriptionGrant>,
    swipes: Vec<SwipeEvent>,
    daily: HashMap<(UserId, NaiveDate), SwipeUsage>,
    requests: BTreeMap<RequestId, ConnectionRequest>,
    next_request_id: RequestId,
    blocks: Vec<BlockRelation>,
}

impl MemoryState {
    fn record_swipe(&mut self, event: &SwipeEvent) {
        self.swipes.push(event.clone());
        self.daily
            .entry((event.user_id, event.created_at.date_naive()))
            .or_default()
            .record(event.direction);
    }

    fn used_in(&self, user_id: UserId, window: UsageWindow) -> u32 {
        match window {
            UsageWindow::Since(since) => SwipeUsage::from_events(
                self.swipes
                    .iter()
                    .filter(|e| e.user_id == user_id && e.created_at > since),
            )
            .total,
            UsageWindow::Day(day) => self
                .daily
                .get(&(user_id, day))
                .map_or(0, |usage| usage.total),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    fail_swiped: AtomicBool,
    fail_blocked: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: UserProfile) {
        self.state.write().await.profiles.insert(profile.user_id, profile);
    }

    pub async fn insert_grant(&self, grant: SubscriptionGrant) {
        self.state.write().await.grants.push(grant);
    }

    pub async fn insert_block(&self, blocker_id: UserId, blocked_id: UserId) {
        self.state.write().await.blocks.push(BlockRelation {
            blocker_id,
            blocked_id,
            is_active: true,
            created_at: Utc::now(),
        });
    }

    /// Deactivate every block from `blocker_id` on `blocked_id`
    pub async fn lift_block(&self, blocker_id: UserId, blocked_id: UserId) {
        let mut state = self.state.write().await;
        for block in state
            .blocks
            .iter_mut()
            .filter(|b| b.blocker_id == blocker_id && b.blocked_id == blocked_id)
        {
            block.is_active = false;
        }
    }

    /// Seed a historical swipe without going through the quota check
    pub async fn insert_swipe_at(&self, user_id: UserId, direction: SwipeDirection, at: DateTime<Utc>) {
        self.state.write().await.record_swipe(&SwipeEvent {
            user_id,
            direction,
            created_at: at,
        });
    }

    pub async fn request_count(&self) -> usize {
        self.state.read().await.requests.len()
    }

    /// Make the given lookup return `StoreError::Unavailable` until switched off
    pub fn fail_lookups(&self, kind: LookupKind, failing: bool) {
        match kind {
            LookupKind::Swiped => self.fail_swiped.store(failing, Ordering::SeqCst),
            LookupKind::Blocked => self.fail_blocked.store(failing, Ordering::SeqCst),
        }
    }

    fn check_lookup(&self, kind: LookupKind) -> Result<(), StoreError> {
        let failing = match kind {
            LookupKind::Swiped => self.fail_swiped.load(Ordering::SeqCst),
            LookupKind::Blocked => self.fail_blocked.load(Ordering::SeqCst),
        };
        if failing {
            return Err(StoreError::Unavailable(format!("{:?} lookup disabled", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn active_grants(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .iter()
            .filter(|g| user_ids.contains(&g.user_id) && g.is_active_at(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SwipeStore for MemoryStore {
    async fn append_swipe(&self, event: &SwipeEvent) -> Result<(), StoreError> {
        self.state.write().await.record_swipe(event);
        Ok(())
    }

    async fn usage_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SwipeUsage, StoreError> {
        let state = self.state.read().await;
        Ok(SwipeUsage::from_events(
            state
                .swipes
                .iter()
                .filter(|e| e.user_id == user_id && e.created_at > since),
        ))
    }

    async fn oldest_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .swipes
            .iter()
            .filter(|e| e.user_id == user_id && e.created_at > since)
            .map(|e| e.created_at)
            .min())
    }

    async fn daily_usage(&self, user_id: UserId, day: NaiveDate) -> Result<SwipeUsage, StoreError> {
        let state = self.state.read().await;
        Ok(state.daily.get(&(user_id, day)).copied().unwrap_or_default())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn get_request(&self, id: RequestId) -> Result<Option<ConnectionRequest>, StoreError> {
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        status: Option<RequestStatus>,
    ) -> Result<Option<ConnectionRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.is_between(a, b))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn counterpart_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        self.check_lookup(LookupKind::Swiped)?;
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter_map(|r| r.counterpart_of(user_id))
            .collect())
    }

    async fn connected_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.is_connected())
            .filter_map(|r| r.counterpart_of(user_id))
            .collect())
    }

    async fn pending_for(&self, receiver_id: UserId) -> Result<Vec<ConnectionRequest>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<ConnectionRequest> = state
            .requests
            .values()
            .filter(|r| r.receiver_id == receiver_id && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| Reverse((r.created_at, r.id)));
        Ok(pending)
    }

    async fn insert_request_with_swipe(
        &self,
        request: &NewConnectionRequest,
        swipe: &SwipeEvent,
        allowance: SwipeAllowance,
    ) -> Result<ConnectionRequest, StoreError> {
        let mut state = self.state.write().await;

        let used = state.used_in(swipe.user_id, allowance.window);
        if used >= allowance.limit {
            return Err(StoreError::QuotaExhausted {
                used,
                limit: allowance.limit,
            });
        }

        let live = state.requests.values().any(|r| {
            r.is_between(request.sender_id, request.receiver_id)
                && matches!(r.status, RequestStatus::Pending | RequestStatus::Accepted)
        });
        if live {
            return Err(StoreError::Conflict(format!(
                "live request between {} and {}",
                request.sender_id, request.receiver_id
            )));
        }

        state.next_request_id += 1;
        let created = ConnectionRequest {
            id: state.next_request_id,
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            social_circle_id: request.social_circle_id,
            request_type: request.request_type,
            message: request.message.clone(),
            status: RequestStatus::Pending,
            sender_status: RequestStatus::Pending,
            receiver_status: RequestStatus::Pending,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        state.requests.insert(created.id, created.clone());
        state.record_swipe(swipe);

        Ok(created)
    }

    async fn update_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(&id) {
            Some(request) if request.status == expected => {
                request.apply(&update, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn blocked_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        self.check_lookup(LookupKind::Blocked)?;
        let state = self.state.read().await;
        Ok(state
            .blocks
            .iter()
            .filter(|b| b.is_active)
            .filter_map(|b| {
                if b.blocker_id == user_id {
                    Some(b.blocked_id)
                } else if b.blocked_id == user_id {
                    Some(b.blocker_id)
                } else {
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<UserProfile>, StoreError> {
        let state = self.state.read().await;
        let mut candidates: Vec<UserProfile> = state
            .profiles
            .values()
            .filter(|p| matches_query_constraints(p, query))
            .cloned()
            .collect();

        match query.order {
            // The whole eligible pool; a prefix of id order would never
            // reach users past the limit once the caller shuffles
            CandidateOrder::Random => return Ok(candidates),
            CandidateOrder::NewestFirst => {
                candidates.sort_by_key(|p| Reverse((p.created_at, p.user_id)))
            }
            CandidateOrder::UserId => {}
        }
        if let Some(limit) = query.limit {
            candidates.truncate(limit);
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestType;
    use chrono::Duration;

    fn allowance(limit: u32) -> SwipeAllowance {
        SwipeAllowance {
            window: UsageWindow::Since(Utc::now() - Duration::hours(12)),
            limit,
        }
    }

    fn new_request(sender_id: UserId, receiver_id: UserId) -> (NewConnectionRequest, SwipeEvent) {
        let now = Utc::now();
        (
            NewConnectionRequest {
                sender_id,
                receiver_id,
                social_circle_id: None,
                request_type: RequestType::RightSwipe,
                message: None,
                created_at: now,
            },
            SwipeEvent {
                user_id: sender_id,
                direction: SwipeDirection::Right,
                created_at: now,
            },
        )
    }

    #[tokio::test]
    async fn test_insert_conflict_leaves_no_swipe() {
        let store = MemoryStore::new();
        let (request, swipe) = new_request(1, 2);
        store.insert_request_with_swipe(&request, &swipe, allowance(50)).await.unwrap();

        let (reverse, reverse_swipe) = new_request(2, 1);
        let result = store
            .insert_request_with_swipe(&reverse, &reverse_swipe, allowance(50))
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.request_count().await, 1);
        let usage = store.usage_since(2, Utc::now() - Duration::hours(1)).await.unwrap();
        assert_eq!(usage.total, 0);
    }

    #[tokio::test]
    async fn test_update_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let (request, swipe) = new_request(1, 2);
        let created = store.insert_request_with_swipe(&request, &swipe, allowance(50)).await.unwrap();

        let accepted = StatusUpdate::all(RequestStatus::Accepted);
        assert!(store
            .update_status(created.id, RequestStatus::Pending, accepted, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .update_status(created.id, RequestStatus::Pending, accepted, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_lifted_block_is_ignored() {
        let store = MemoryStore::new();
        store.insert_block(1, 2).await;
        store.insert_block(3, 1).await;
        store.lift_block(1, 2).await;

        assert_eq!(store.blocked_ids(1).await.unwrap(), HashSet::from([3]));
    }

    #[tokio::test]
    async fn test_concurrent_swipes_are_all_counted() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let event = SwipeEvent {
                        user_id: 5,
                        direction: SwipeDirection::Left,
                        created_at: now,
                    };
                    store.append_swipe(&event).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.daily_usage(5, now.date_naive()).await.unwrap().total, 40);
        assert_eq!(
            store.usage_since(5, now - Duration::hours(1)).await.unwrap().left,
            40
        );
    }

    #[tokio::test]
    async fn test_insert_refuses_exhausted_allowance() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for _ in 0..3 {
            store.insert_swipe_at(1, SwipeDirection::Left, now - Duration::minutes(5)).await;
        }

        let (request, swipe) = new_request(1, 2);
        let result = store.insert_request_with_swipe(&request, &swipe, allowance(3)).await;

        assert!(matches!(
            result,
            Err(StoreError::QuotaExhausted { used: 3, limit: 3 })
        ));
        assert_eq!(store.request_count().await, 0);
        assert_eq!(store.usage_since(1, now - Duration::hours(1)).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_concurrent_sends_never_overdraw_quota() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let now = Utc::now();
        for _ in 0..4 {
            store.insert_swipe_at(1, SwipeDirection::Left, now - Duration::minutes(1)).await;
        }

        let handles: Vec<_> = (2..34)
            .map(|receiver| {
                let store = store.clone();
                tokio::spawn(async move {
                    let (request, swipe) = new_request(1, receiver);
                    store.insert_request_with_swipe(&request, &swipe, allowance(5)).await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.usage_since(1, now - Duration::hours(1)).await.unwrap().total, 5);
    }

    #[tokio::test]
    async fn test_random_order_returns_whole_pool() {
        let store = MemoryStore::new();
        for user_id in 2..=300 {
            store
                .insert_profile(UserProfile {
                    user_id,
                    name: format!("User {}", user_id),
                    gender: None,
                    birth_date: None,
                    country_id: None,
                    interests: vec![],
                    social_circle_ids: vec![],
                    is_active: true,
                    is_deleted: false,
                    created_at: Utc::now(),
                })
                .await;
        }

        let mut query = CandidateQuery::new(1);
        query.limit = Some(50);
        let pool = store.query_candidates(&query).await.unwrap();
        assert_eq!(pool.len(), 299);

        query.order = CandidateOrder::UserId;
        let ordered = store.query_candidates(&query).await.unwrap();
        assert_eq!(ordered.len(), 50);
        assert_eq!(ordered.last().map(|p| p.user_id), Some(51));
    }
}

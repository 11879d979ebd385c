use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::models::{ConnectionRequest, RequestStatus, UserId};
use crate::services::{BlockStore, ConnectionStore, StoreError};

/// What to do when an exclusion lookup fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Log and continue with an empty set
    FailOpen,
    /// Surface the failure to the caller
    FailClosed,
}

/// Lookup failure policy for each exclusion set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionPolicy {
    pub swiped: LookupFailurePolicy,
    pub blocked: LookupFailurePolicy,
}

impl ExclusionPolicy {
    /// Swallow every lookup failure
    pub fn fail_open() -> Self {
        Self {
            swiped: LookupFailurePolicy::FailOpen,
            blocked: LookupFailurePolicy::FailOpen,
        }
    }
}

impl Default for ExclusionPolicy {
    /// A failed block lookup must not resurface blocked users
    fn default() -> Self {
        Self {
            swiped: LookupFailurePolicy::FailOpen,
            blocked: LookupFailurePolicy::FailClosed,
        }
    }
}

/// Read-only relationship predicates over connection requests and blocks
pub struct ConnectionGraphQuery {
    connections: Arc<dyn ConnectionStore>,
    blocks: Arc<dyn BlockStore>,
}

impl ConnectionGraphQuery {
    pub fn new(connections: Arc<dyn ConnectionStore>, blocks: Arc<dyn BlockStore>) -> Self {
        Self { connections, blocks }
    }

    /// Everyone `user_id` shares a request with, in any status
    pub async fn swiped_user_ids(
        &self,
        user_id: UserId,
        on_failure: LookupFailurePolicy,
    ) -> EngineResult<HashSet<UserId>> {
        let result = self.connections.counterpart_ids(user_id).await.map(|mut ids| {
            ids.remove(&user_id);
            ids
        });
        recover("swiped", user_id, result, on_failure)
    }

    /// Everyone blocking or blocked by `user_id` through an active block
    pub async fn blocked_user_ids(
        &self,
        user_id: UserId,
        on_failure: LookupFailurePolicy,
    ) -> EngineResult<HashSet<UserId>> {
        let result = self.blocks.blocked_ids(user_id).await.map(|mut ids| {
            ids.remove(&user_id);
            ids
        });
        recover("blocked", user_id, result, on_failure)
    }

    /// Self, swiped and blocked ids combined
    pub async fn exclusion_set(
        &self,
        user_id: UserId,
        policy: ExclusionPolicy,
    ) -> EngineResult<HashSet<UserId>> {
        let mut excluded = self.swiped_user_ids(user_id, policy.swiped).await?;
        excluded.extend(self.blocked_user_ids(user_id, policy.blocked).await?);
        excluded.insert(user_id);
        Ok(excluded)
    }

    pub async fn are_connected(&self, a: UserId, b: UserId) -> EngineResult<bool> {
        let accepted = self
            .connections
            .find_between(a, b, Some(RequestStatus::Accepted))
            .await?;
        Ok(accepted.map(|request| request.is_connected()).unwrap_or(false))
    }

    pub async fn connection_count(&self, user_id: UserId) -> EngineResult<usize> {
        Ok(self.connected_user_ids(user_id).await?.len())
    }

    pub async fn connected_user_ids(&self, user_id: UserId) -> EngineResult<HashSet<UserId>> {
        Ok(self.connections.connected_ids(user_id).await?)
    }

    /// Any request between the pair, either direction, any status
    pub async fn pending_request_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> EngineResult<Option<ConnectionRequest>> {
        Ok(self.connections.find_between(a, b, None).await?)
    }

    /// Requests waiting on `receiver_id`, newest first
    pub async fn pending_requests_for(&self, receiver_id: UserId) -> EngineResult<Vec<ConnectionRequest>> {
        Ok(self.connections.pending_for(receiver_id).await?)
    }
}

fn recover(
    kind: &str,
    user_id: UserId,
    result: Result<HashSet<UserId>, StoreError>,
    on_failure: LookupFailurePolicy,
) -> EngineResult<HashSet<UserId>> {
    match (result, on_failure) {
        (Ok(ids), _) => Ok(ids),
        (Err(e), LookupFailurePolicy::FailOpen) => {
            tracing::warn!(
                "Failed to fetch {} users for {}, proceeding without filtering: {}",
                kind,
                user_id,
                e
            );
            Ok(HashSet::new())
        }
        (Err(e), LookupFailurePolicy::FailClosed) => {
            tracing::error!("Failed to fetch {} users for {}: {}", kind, user_id, e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::{
        NewConnectionRequest, RequestType, StatusUpdate, SwipeAllowance, SwipeDirection, SwipeEvent,
        UsageWindow,
    };
    use crate::services::{LookupKind, MemoryStore};
    use chrono::Utc;

    async fn connect(store: &MemoryStore, sender: UserId, receiver: UserId) -> ConnectionRequest {
        let now = Utc::now();
        let request = NewConnectionRequest {
            sender_id: sender,
            receiver_id: receiver,
            social_circle_id: None,
            request_type: RequestType::RightSwipe,
            message: None,
            created_at: now,
        };
        let swipe = SwipeEvent {
            user_id: sender,
            direction: SwipeDirection::Right,
            created_at: now,
        };
        let allowance = SwipeAllowance {
            window: UsageWindow::Day(now.date_naive()),
            limit: 50,
        };
        store
            .insert_request_with_swipe(&request, &swipe, allowance)
            .await
            .unwrap()
    }

    fn graph(store: &Arc<MemoryStore>) -> ConnectionGraphQuery {
        ConnectionGraphQuery::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_swiped_ids_cover_both_directions() {
        let store = Arc::new(MemoryStore::new());
        connect(&store, 1, 2).await;
        connect(&store, 3, 1).await;
        connect(&store, 4, 5).await;

        let ids = graph(&store)
            .swiped_user_ids(1, LookupFailurePolicy::FailOpen)
            .await
            .unwrap();
        assert_eq!(ids, HashSet::from([2, 3]));
    }

    #[tokio::test]
    async fn test_connected_requires_both_sides_accepted() {
        let store = Arc::new(MemoryStore::new());
        let request = connect(&store, 1, 2).await;
        let query = graph(&store);

        assert!(!query.are_connected(1, 2).await.unwrap());

        store
            .update_status(request.id, RequestStatus::Pending, StatusUpdate::all(RequestStatus::Accepted), Utc::now())
            .await
            .unwrap();

        assert!(query.are_connected(2, 1).await.unwrap());
        assert_eq!(query.connection_count(1).await.unwrap(), 1);
        assert_eq!(query.connection_count(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocked_lookup_failure_policies() {
        let store = Arc::new(MemoryStore::new());
        store.insert_block(1, 9).await;
        store.fail_lookups(LookupKind::Blocked, true);
        let query = graph(&store);

        let open = query.blocked_user_ids(1, LookupFailurePolicy::FailOpen).await.unwrap();
        assert!(open.is_empty());

        let closed = query.blocked_user_ids(1, LookupFailurePolicy::FailClosed).await;
        assert!(matches!(closed, Err(EngineError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_exclusion_set_includes_self() {
        let store = Arc::new(MemoryStore::new());
        connect(&store, 1, 2).await;
        store.insert_block(7, 1).await;

        let excluded = graph(&store)
            .exclusion_set(1, ExclusionPolicy::default())
            .await
            .unwrap();
        assert_eq!(excluded, HashSet::from([1, 2, 7]));
    }
}

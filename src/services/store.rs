//! Persistence ports consumed by the engine.
//!
//! Postgres and in-memory backends implement every trait here with the same
//! semantics, so the core never knows which one it is talking to.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{
    CandidateQuery, ConnectionRequest, NewConnectionRequest, RequestId, RequestStatus,
    StatusUpdate, SubscriptionGrant, SwipeAllowance, SwipeEvent, SwipeUsage, UserId, UserProfile,
};

/// Errors raised by any storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Swipe quota exhausted: {used} of {limit} used")]
    QuotaExhausted { used: u32, limit: u32 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Grants that are active and unexpired at `now` for any of the users
    async fn active_grants(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>, StoreError>;
}

#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// Append a swipe and bump the calendar-day counter in one atomic step
    async fn append_swipe(&self, event: &SwipeEvent) -> Result<(), StoreError>;

    /// Tallies of swipes strictly newer than `since`
    async fn usage_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SwipeUsage, StoreError>;

    /// Timestamp of the oldest swipe strictly newer than `since`
    async fn oldest_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Calendar-day counter row (UTC)
    async fn daily_usage(&self, user_id: UserId, day: NaiveDate) -> Result<SwipeUsage, StoreError>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_request(&self, id: RequestId) -> Result<Option<ConnectionRequest>, StoreError>;

    /// Most recent request between the unordered pair, optionally restricted to a status
    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        status: Option<RequestStatus>,
    ) -> Result<Option<ConnectionRequest>, StoreError>;

    /// Every user that shares a request of any status with `user_id`
    async fn counterpart_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError>;

    /// Counterparts of fully accepted requests
    async fn connected_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError>;

    /// Pending requests addressed to `receiver_id`, newest first
    async fn pending_for(&self, receiver_id: UserId) -> Result<Vec<ConnectionRequest>, StoreError>;

    /// Insert the request and record the sender's swipe as one unit.
    ///
    /// The sender's usage in `allowance.window` is counted inside the same
    /// unit; at or over `allowance.limit` nothing is written and
    /// `StoreError::QuotaExhausted` is returned. Returns
    /// `StoreError::Conflict` if the pair already has a live request.
    async fn insert_request_with_swipe(
        &self,
        request: &NewConnectionRequest,
        swipe: &SwipeEvent,
        allowance: SwipeAllowance,
    ) -> Result<ConnectionRequest, StoreError>;

    /// Apply `update` only if the request is currently in `expected`.
    /// Returns whether a row changed.
    async fn update_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Users blocked by or blocking `user_id` through an active block
    async fn blocked_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Discoverable profiles matching the query (self and exclusions removed).
    ///
    /// With `CandidateOrder::Random` the result is either the whole eligible
    /// pool or a uniform sample of at most `limit` profiles.
    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<UserProfile>, StoreError>;
}

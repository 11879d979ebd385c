use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::domain::{
    ConnectionRequest, RequestId, RequestStatus, ScoredCandidate, TierId, UserId, UserProfile,
};

/// Swipe quota snapshot for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeStats {
    pub total_swipes: u32,
    pub left_swipes: u32,
    pub right_swipes: u32,
    pub super_likes: u32,
    pub swipe_limit: u32,
    pub remaining_swipes: u32,
    pub resets_at: Option<DateTime<Utc>>,
    pub has_boost: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub candidates: Vec<UserProfile>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub candidates: Vec<ScoredCandidate>,
    pub total_results: usize,
}

/// Requests awaiting the user's answer, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<ConnectionRequest>,
    pub total_results: usize,
}

/// A user's plans after a refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementsResponse {
    pub user_id: UserId,
    pub tier_ids: Vec<TierId>,
    pub unlimited: bool,
    pub boost: bool,
    pub travel: bool,
}

/// Outcome of accept / reject / disconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub success: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Body returned when a pair already has a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateResponse {
    pub error: String,
    pub request_id: RequestId,
    pub status: RequestStatus,
}

/// Body returned when the swipe quota is used up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaExceededResponse {
    pub error: String,
    pub swipe_limit: u32,
    pub remaining_swipes: u32,
    pub resets_at: Option<DateTime<Utc>>,
}

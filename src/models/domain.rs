use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type TierId = i64;
pub type SocialCircleId = i64;
pub type CountryId = i64;
pub type RequestId = i64;

/// User profile as read from the profile store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(rename = "birthDate", default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "countryId", default)]
    pub country_id: Option<CountryId>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(rename = "socialCircleIds", default)]
    pub social_circle_ids: Vec<SocialCircleId>,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Age in whole years on the given day, if a birth date is known
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.birth_date.and_then(|birth| today.years_since(birth))
    }

    /// Active and not soft-deleted
    pub fn is_discoverable(&self) -> bool {
        self.is_active && !self.is_deleted
    }

    pub fn in_any_circle(&self, circle_ids: &[SocialCircleId]) -> bool {
        circle_ids.iter().any(|id| self.social_circle_ids.contains(id))
    }
}

fn default_true() -> bool {
    true
}

/// Direction of a single swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
    Super,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeDirection::Left => "left",
            SwipeDirection::Right => "right",
            SwipeDirection::Super => "super",
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwipeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(SwipeDirection::Left),
            "right" => Ok(SwipeDirection::Right),
            "super" => Ok(SwipeDirection::Super),
            other => Err(format!("unknown swipe direction '{}'", other)),
        }
    }
}

/// A recorded swipe. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeEvent {
    pub user_id: UserId,
    pub direction: SwipeDirection,
    pub created_at: DateTime<Utc>,
}

/// Swipe tallies over some window
///
/// A super-like also counts as a right swipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeUsage {
    pub total: u32,
    pub left: u32,
    pub right: u32,
    pub super_likes: u32,
}

impl SwipeUsage {
    pub fn record(&mut self, direction: SwipeDirection) {
        self.total = self.total.saturating_add(1);
        match direction {
            SwipeDirection::Left => self.left = self.left.saturating_add(1),
            SwipeDirection::Right => self.right = self.right.saturating_add(1),
            SwipeDirection::Super => {
                self.right = self.right.saturating_add(1);
                self.super_likes = self.super_likes.saturating_add(1);
            }
        }
    }

    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a SwipeEvent>,
    {
        let mut usage = SwipeUsage::default();
        for event in events {
            usage.record(event.direction);
        }
        usage
    }
}

/// Which swipes count against the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageWindow {
    /// Swipe events strictly newer than the instant
    Since(DateTime<Utc>),
    /// The calendar-day counter for a UTC date
    Day(NaiveDate),
}

/// Quota the store re-checks inside the write that consumes a swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeAllowance {
    pub window: UsageWindow,
    pub limit: u32,
}

/// Lifecycle status of a connection request (and of each side's sub-status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Disconnected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Disconnected => "disconnected",
        }
    }

    /// Whether the workflow allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Accepted)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Pending, RequestStatus::Disconnected)
                | (RequestStatus::Accepted, RequestStatus::Disconnected)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            "disconnected" => Ok(RequestStatus::Disconnected),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// How a connection request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    LeftSwipe,
    RightSwipe,
    SuperLike,
    Direct,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::LeftSwipe => "left_swipe",
            RequestType::RightSwipe => "right_swipe",
            RequestType::SuperLike => "super_like",
            RequestType::Direct => "direct",
        }
    }

    /// Swipe recorded against the sender's quota for this request
    pub fn swipe_direction(&self) -> SwipeDirection {
        match self {
            RequestType::LeftSwipe => SwipeDirection::Left,
            RequestType::SuperLike => SwipeDirection::Super,
            RequestType::RightSwipe | RequestType::Direct => SwipeDirection::Right,
        }
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left_swipe" => Ok(RequestType::LeftSwipe),
            "right_swipe" => Ok(RequestType::RightSwipe),
            "super_like" => Ok(RequestType::SuperLike),
            "direct" => Ok(RequestType::Direct),
            other => Err(format!("unknown request type '{}'", other)),
        }
    }
}

/// Persisted connection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub social_circle_id: Option<SocialCircleId>,
    pub request_type: RequestType,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub sender_status: RequestStatus,
    pub receiver_status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRequest {
    /// True for either direction of the unordered pair
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// The other side of the request, if `user_id` is part of it
    pub fn counterpart_of(&self, user_id: UserId) -> Option<UserId> {
        if self.sender_id == user_id {
            Some(self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(self.sender_id)
        } else {
            None
        }
    }

    /// Accepted on both sides
    pub fn is_connected(&self) -> bool {
        self.status == RequestStatus::Accepted
            && self.sender_status == RequestStatus::Accepted
            && self.receiver_status == RequestStatus::Accepted
    }

    pub fn apply(&mut self, update: &StatusUpdate, at: DateTime<Utc>) {
        self.status = update.status;
        if let Some(sender_status) = update.sender_status {
            self.sender_status = sender_status;
        }
        if let Some(receiver_status) = update.receiver_status {
            self.receiver_status = receiver_status;
        }
        self.updated_at = at;
    }
}

/// Input for creating a connection request
#[derive(Debug, Clone)]
pub struct NewConnectionRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub social_circle_id: Option<SocialCircleId>,
    pub request_type: RequestType,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Status change applied to a connection request.
/// `None` sub-statuses are left as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: RequestStatus,
    pub sender_status: Option<RequestStatus>,
    pub receiver_status: Option<RequestStatus>,
}

impl StatusUpdate {
    /// Sets the overall status and both sub-statuses
    pub fn all(status: RequestStatus) -> Self {
        Self {
            status,
            sender_status: Some(status),
            receiver_status: Some(status),
        }
    }
}

/// Block between two users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRelation {
    pub blocker_id: UserId,
    pub blocked_id: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("unknown subscription status '{}'", other)),
        }
    }
}

/// Subscription plan held by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionGrant {
    pub user_id: UserId,
    pub plan_id: TierId,
    pub status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
}

impl SubscriptionGrant {
    /// Counts toward entitlement only while active and unexpired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at > now
    }
}

/// Ordering requested from the profile store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    /// Any order; the selector shuffles
    Random,
    /// Most recently created first
    NewestFirst,
    /// Ascending user id
    UserId,
}

/// Candidate query parameters
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub requester_id: UserId,
    pub exclude_user_ids: HashSet<UserId>,
    /// ANY-of semantics; empty means no circle restriction
    pub social_circle_ids: Vec<SocialCircleId>,
    pub country_id: Option<CountryId>,
    /// Only users with an id strictly greater than this
    pub min_user_id: Option<UserId>,
    pub order: CandidateOrder,
    pub limit: Option<usize>,
}

impl CandidateQuery {
    pub fn new(requester_id: UserId) -> Self {
        Self {
            requester_id,
            exclude_user_ids: HashSet::new(),
            social_circle_ids: Vec::new(),
            country_id: None,
            min_user_id: None,
            order: CandidateOrder::Random,
            limit: None,
        }
    }
}

/// Optional discovery filters supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverFilters {
    #[serde(rename = "socialCircleIds", default)]
    pub social_circle_ids: Vec<SocialCircleId>,
    #[serde(rename = "countryId", default)]
    pub country_id: Option<CountryId>,
}

/// Candidate with its compatibility score against the requester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(rename = "compatibilityScore")]
    pub score: f64,
}

/// Compatibility scoring weights
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub social_circles: f64,
    pub country: f64,
    pub age_close: f64,
    pub age_near: f64,
    pub interests: f64,
    pub age_close_years: u32,
    pub age_near_years: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            social_circles: 0.4,
            country: 0.3,
            age_close: 0.2,
            age_near: 0.1,
            interests: 0.1,
            age_close_years: 5,
            age_near_years: 10,
        }
    }
}

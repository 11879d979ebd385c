// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BlockRelation, CandidateOrder, CandidateQuery, ConnectionRequest, CountryId, DiscoverFilters,
    NewConnectionRequest, RequestId, RequestStatus, RequestType, ScoredCandidate, ScoringWeights,
    SocialCircleId, StatusUpdate, SubscriptionGrant, SubscriptionStatus, SwipeAllowance,
    SwipeDirection, SwipeEvent, SwipeUsage, TierId, UsageWindow, UserId, UserProfile,
};
pub use requests::{DisconnectRequest, DiscoverMode, DiscoverQuery, RespondRequest, SwipeRequest, UserQuery};
pub use responses::{
    DiscoverResponse, DuplicateResponse, EntitlementsResponse, ErrorResponse, HealthResponse, PendingRequestsResponse,
    QuotaExceededResponse,
    RecommendationsResponse, SwipeResponse, SwipeStats, TransitionResponse,
};

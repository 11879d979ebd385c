use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::models::domain::{CountryId, RequestType, SocialCircleId, UserId};

/// Swipe on a candidate, creating a connection request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SwipeRequest {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
    #[validate(range(min = 1))]
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: UserId,
    #[serde(alias = "social_circle_id", rename = "socialCircleId", default)]
    pub social_circle_id: Option<SocialCircleId>,
    #[serde(alias = "request_type", rename = "requestType")]
    pub request_type: RequestType,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub message: Option<String>,
}

/// Accept or reject a request on behalf of a user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RespondRequest {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DisconnectRequest {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
    #[validate(range(min = 1))]
    #[serde(alias = "other_user_id", rename = "otherUserId")]
    pub other_user_id: UserId,
}

/// Discovery query string
///
/// `socialCircleIds` is a comma-separated list.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscoverQuery {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
    #[serde(alias = "social_circle_ids", rename = "socialCircleIds", default)]
    pub social_circle_ids: Option<String>,
    #[serde(alias = "country_id", rename = "countryId", default)]
    pub country_id: Option<CountryId>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: u16,
    #[serde(default)]
    pub mode: DiscoverMode,
}

impl DiscoverQuery {
    /// Parse the comma-separated circle ids, skipping anything that isn't a number
    pub fn circle_ids(&self) -> Vec<SocialCircleId> {
        self.social_circle_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverMode {
    #[default]
    Random,
    Latest,
}

/// Query string carrying just the acting user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserQuery {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: u16,
}

fn default_limit() -> u16 {
    20
}

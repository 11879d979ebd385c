use crate::models::{CandidateQuery, DiscoverFilters, UserProfile};

/// Check if a profile satisfies the candidate query
///
/// Stores push the same constraints down into their own queries; this is the
/// reference check applied again before ranking.
#[inline]
pub fn matches_query_constraints(profile: &UserProfile, query: &CandidateQuery) -> bool {
    // Skip self, deleted and inactive users
    if profile.user_id == query.requester_id || !profile.is_discoverable() {
        return false;
    }

    // Check excluded users
    if query.exclude_user_ids.contains(&profile.user_id) {
        return false;
    }

    // Seed and test accounts sit below the id floor
    if let Some(min_id) = query.min_user_id {
        if profile.user_id <= min_id {
            return false;
        }
    }

    if !query.social_circle_ids.is_empty() && !profile.in_any_circle(&query.social_circle_ids) {
        return false;
    }

    if let Some(country_id) = query.country_id {
        if profile.country_id != Some(country_id) {
            return false;
        }
    }

    true
}

/// Copy caller filters onto a query
pub fn apply_filters(query: &mut CandidateQuery, filters: &DiscoverFilters) {
    query.social_circle_ids = filters.social_circle_ids.clone();
    query.country_id = filters.country_id;
}

use chrono::NaiveDate;
use std::collections::HashSet;
use std::hash::Hash;

use crate::core::clock::Clock;
use crate::models::{ScoringWeights, UserProfile};

/// Weighted compatibility between two profiles, in [0, 1]
///
/// Scoring formula:
/// score = (
///     jaccard(circles) * 0.4 +     # shared social circles
///     same_country     * 0.3 +     # flat bonus
///     age_proximity    (0.2|0.1) + # within 5 / 10 years
///     jaccard(interests) * 0.1     # shared interests
/// )
///
/// A factor only contributes when both profiles carry its data.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityScorer {
    weights: ScoringWeights,
}

impl CompatibilityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score with ages taken on the clock's current UTC date
    pub fn score(&self, a: &UserProfile, b: &UserProfile, clock: &dyn Clock) -> f64 {
        self.score_on(a, b, clock.now().date_naive())
    }

    pub fn score_on(&self, a: &UserProfile, b: &UserProfile, today: NaiveDate) -> f64 {
        let mut total = 0.0;
        let mut contributed = false;

        // Social circle overlap
        if let Some(overlap) = jaccard(&a.social_circle_ids, &b.social_circle_ids) {
            total += overlap * self.weights.social_circles;
            contributed = true;
        }

        // Same country
        if let (Some(country_a), Some(country_b)) = (a.country_id, b.country_id) {
            if country_a == country_b {
                total += self.weights.country;
            }
            contributed = true;
        }

        // Age proximity
        if let (Some(age_a), Some(age_b)) = (a.age_on(today), b.age_on(today)) {
            total += self.age_score(age_a.abs_diff(age_b));
            contributed = true;
        }

        // Interest overlap
        if let Some(overlap) = jaccard(&a.interests, &b.interests) {
            total += overlap * self.weights.interests;
            contributed = true;
        }

        if !contributed {
            return 0.0;
        }

        total.clamp(0.0, 1.0)
    }

    #[inline]
    fn age_score(&self, gap_years: u32) -> f64 {
        if gap_years <= self.weights.age_close_years {
            self.weights.age_close
        } else if gap_years <= self.weights.age_near_years {
            self.weights.age_near
        } else {
            0.0
        }
    }
}

/// |A ∩ B| / |A ∪ B|, or `None` if either side is empty
#[inline]
fn jaccard<T: Eq + Hash>(a: &[T], b: &[T]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let set_a: HashSet<&T> = a.iter().collect();
    let set_b: HashSet<&T> = b.iter().collect();
    let union = set_a.union(&set_b).count();
    let intersection = set_a.intersection(&set_b).count();

    Some(intersection as f64 / union as f64)
}

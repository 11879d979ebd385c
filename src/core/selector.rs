use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::core::clock::Clock;
use crate::core::entitlements::SubscriptionEntitlementResolver;
use crate::core::filters::{apply_filters, matches_query_constraints};
use crate::core::graph::{ConnectionGraphQuery, ExclusionPolicy};
use crate::core::scoring::CompatibilityScorer;
use crate::core::window::SwipeWindowCounter;
use crate::error::EngineResult;
use crate::models::{
    CandidateOrder, CandidateQuery, DiscoverFilters, ScoredCandidate, SocialCircleId, UserId,
    UserProfile,
};
use crate::services::ProfileStore;

/// Discovery tuning
#[derive(Debug, Clone, Copy)]
pub struct DiscoverySettings {
    /// Users at or below this id are seed/test accounts
    pub min_candidate_id: UserId,
    /// Front-of-line slots reserved for boosted users
    pub boost_slots: usize,
    pub oversample_factor: usize,
    pub max_batch: usize,
    /// Upper bound on profiles pulled for random picks
    pub pool_size: usize,
    /// Hide the swipe surface from users with no quota left
    pub gate_on_quota: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            min_candidate_id: 10,
            boost_slots: 5,
            oversample_factor: 3,
            max_batch: 50,
            pool_size: 200,
            gate_on_quota: true,
        }
    }
}

/// Produces filtered, ranked candidate lists for a requester
///
/// # Orderings
/// - `discover`: uniform shuffle
/// - `discover_latest_with_boost_priority`: boosted first, each class shuffled
/// - `recommendations_by_compatibility`: descending compatibility, deterministic
#[derive(Clone)]
pub struct CandidateSelector {
    profiles: Arc<dyn ProfileStore>,
    graph: Arc<ConnectionGraphQuery>,
    swipes: Arc<SwipeWindowCounter>,
    entitlements: Arc<SubscriptionEntitlementResolver>,
    scorer: CompatibilityScorer,
    settings: DiscoverySettings,
    policy: ExclusionPolicy,
    clock: Arc<dyn Clock>,
    rng: Arc<Mutex<StdRng>>,
}

impl CandidateSelector {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        graph: Arc<ConnectionGraphQuery>,
        swipes: Arc<SwipeWindowCounter>,
        entitlements: Arc<SubscriptionEntitlementResolver>,
        scorer: CompatibilityScorer,
        settings: DiscoverySettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            profiles,
            graph,
            swipes,
            entitlements,
            scorer,
            settings,
            policy: ExclusionPolicy::default(),
            clock,
            rng: Arc::new(Mutex::new(StdRng::from_os_rng())),
        }
    }

    /// Replace the random source with a seeded one
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Copy of this selector using a different exclusion failure policy
    pub fn with_policy(&self, policy: ExclusionPolicy) -> Self {
        let mut selector = self.clone();
        selector.policy = policy;
        selector
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Random-order browse over eligible candidates
    pub async fn discover(
        &self,
        requester_id: UserId,
        filters: &DiscoverFilters,
        limit: usize,
    ) -> EngineResult<Vec<UserProfile>> {
        if limit == 0 || !self.passes_quota_gate(requester_id).await? {
            return Ok(Vec::new());
        }

        let mut query = self.base_query(requester_id, &[]).await?;
        apply_filters(&mut query, filters);
        query.order = CandidateOrder::Random;
        query.limit = Some(self.settings.pool_size.max(limit));

        let mut candidates = self.fetch(&query).await?;
        self.with_rng(|rng| candidates.shuffle(rng));
        candidates.truncate(limit);

        tracing::info!(
            "Returning {} discover candidates for user {}",
            candidates.len(),
            requester_id
        );
        Ok(candidates)
    }

    /// Newest eligible users, boosted ones placed first
    pub async fn discover_latest_with_boost_priority(
        &self,
        requester_id: UserId,
        filters: &DiscoverFilters,
        limit: usize,
    ) -> EngineResult<Vec<UserProfile>> {
        if limit == 0 || !self.passes_quota_gate(requester_id).await? {
            return Ok(Vec::new());
        }

        let mut query = self.base_query(requester_id, &[]).await?;
        apply_filters(&mut query, filters);
        query.min_user_id = Some(self.settings.min_candidate_id);
        query.order = CandidateOrder::NewestFirst;
        query.limit = Some(
            limit
                .saturating_mul(self.settings.oversample_factor)
                .min(self.settings.max_batch),
        );

        let batch = self.fetch(&query).await?;
        let ids: Vec<UserId> = batch.iter().map(|p| p.user_id).collect();
        let boosted = self.entitlements.boosted_among(&ids).await?;

        tracing::debug!(
            "Latest batch for {}: {} candidates, {} boosted",
            requester_id,
            batch.len(),
            boosted.len()
        );

        let ranked = self.with_rng(|rng| {
            arrange_with_boost_priority(batch, &boosted, self.settings.boost_slots, limit, rng)
        });
        Ok(ranked)
    }

    /// One random eligible member of a social circle
    pub async fn random_from_social_circle(
        &self,
        requester_id: UserId,
        circle_id: SocialCircleId,
        exclude_ids: &[UserId],
    ) -> EngineResult<Option<UserProfile>> {
        if !self.passes_quota_gate(requester_id).await? {
            return Ok(None);
        }

        let mut query = self.base_query(requester_id, exclude_ids).await?;
        query.social_circle_ids = vec![circle_id];
        query.limit = Some(self.settings.pool_size);

        let pool = self.fetch(&query).await?;
        Ok(self.with_rng(|rng| pool.choose(rng).cloned()))
    }

    /// One random eligible user anywhere above the id floor
    pub async fn random_any(
        &self,
        requester_id: UserId,
        exclude_ids: &[UserId],
    ) -> EngineResult<Option<UserProfile>> {
        if !self.passes_quota_gate(requester_id).await? {
            return Ok(None);
        }

        let mut query = self.base_query(requester_id, exclude_ids).await?;
        query.min_user_id = Some(self.settings.min_candidate_id);
        query.limit = Some(self.settings.pool_size);

        let pool = self.fetch(&query).await?;
        Ok(self.with_rng(|rng| pool.choose(rng).cloned()))
    }

    /// Candidates sharing a circle with the requester, best compatibility first
    pub async fn recommendations_by_compatibility(
        &self,
        requester_id: UserId,
        limit: usize,
    ) -> EngineResult<Vec<ScoredCandidate>> {
        let requester = match self.profiles.get_profile(requester_id).await? {
            Some(profile) => profile,
            None => {
                tracing::debug!("No profile for {}, no recommendations", requester_id);
                return Ok(Vec::new());
            }
        };

        if limit == 0 || requester.social_circle_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = self.base_query(requester_id, &[]).await?;
        query.social_circle_ids = requester.social_circle_ids.clone();
        query.order = CandidateOrder::UserId;
        query.limit = Some(self.settings.pool_size);

        let candidates = self.fetch(&query).await?;

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|profile| {
                let score = self.scorer.score(&requester, &profile, self.clock.as_ref());
                ScoredCandidate { profile, score }
            })
            .collect();

        // Sort by score (descending) and then by user id (ascending)
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn passes_quota_gate(&self, requester_id: UserId) -> EngineResult<bool> {
        if !self.settings.gate_on_quota {
            return Ok(true);
        }

        let allowed = self.swipes.can_swipe(requester_id).await?;
        if !allowed {
            tracing::debug!("User {} has no swipes left, hiding discovery", requester_id);
        }
        Ok(allowed)
    }

    async fn base_query(
        &self,
        requester_id: UserId,
        exclude_ids: &[UserId],
    ) -> EngineResult<CandidateQuery> {
        let mut query = CandidateQuery::new(requester_id);
        query.exclude_user_ids = self.graph.exclusion_set(requester_id, self.policy).await?;
        query.exclude_user_ids.extend(exclude_ids.iter().copied());
        Ok(query)
    }

    /// Query the store and re-check every constraint locally
    async fn fetch(&self, query: &CandidateQuery) -> EngineResult<Vec<UserProfile>> {
        let candidates: Vec<UserProfile> = self
            .profiles
            .query_candidates(query)
            .await?
            .into_iter()
            .filter(|profile| matches_query_constraints(profile, query))
            .collect();
        Ok(candidates)
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

/// Two-tier ranking: up to `boost_slots` shuffled boosted candidates first,
/// then shuffled regular candidates (including any boosted overflow).
pub fn arrange_with_boost_priority<R: Rng + ?Sized>(
    batch: Vec<UserProfile>,
    boosted_ids: &HashSet<UserId>,
    boost_slots: usize,
    limit: usize,
    rng: &mut R,
) -> Vec<UserProfile> {
    let (mut boosted, mut regular): (Vec<UserProfile>, Vec<UserProfile>) = batch
        .into_iter()
        .partition(|profile| boosted_ids.contains(&profile.user_id));

    boosted.shuffle(rng);
    let front = boost_slots.min(limit).min(boosted.len());
    let overflow = boosted.split_off(front);

    regular.extend(overflow);
    regular.shuffle(rng);

    let mut ranked = boosted;
    ranked.extend(regular.into_iter().take(limit - front));
    ranked
}

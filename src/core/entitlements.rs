use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::error::EngineResult;
use crate::models::{TierId, UserId};
use crate::services::{CacheError, CacheKey, CacheManager, SubscriptionStore};

/// Plans that lift the swipe quota entirely
pub const DEFAULT_UNLIMITED_TIERS: [TierId; 2] = [3, 6];
/// Plans that add the boost bonus and front-of-line discovery
pub const DEFAULT_BOOST_TIERS: [TierId; 2] = [2, 5];
/// Plans that unlock travel mode
pub const DEFAULT_TRAVEL_TIERS: [TierId; 2] = [4, 7];

/// Which plan ids confer which entitlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    pub unlimited: HashSet<TierId>,
    pub boost: HashSet<TierId>,
    pub travel: HashSet<TierId>,
}

impl TierPolicy {
    pub fn new(
        unlimited: impl IntoIterator<Item = TierId>,
        boost: impl IntoIterator<Item = TierId>,
        travel: impl IntoIterator<Item = TierId>,
    ) -> Self {
        Self {
            unlimited: unlimited.into_iter().collect(),
            boost: boost.into_iter().collect(),
            travel: travel.into_iter().collect(),
        }
    }

    pub fn summarize(&self, tier_ids: HashSet<TierId>) -> Entitlements {
        Entitlements {
            unlimited: !self.unlimited.is_disjoint(&tier_ids),
            boost: !self.boost.is_disjoint(&tier_ids),
            travel: !self.travel.is_disjoint(&tier_ids),
            tier_ids,
        }
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_UNLIMITED_TIERS, DEFAULT_BOOST_TIERS, DEFAULT_TRAVEL_TIERS)
    }
}

/// A user's active plans and the entitlements they add up to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entitlements {
    pub tier_ids: HashSet<TierId>,
    pub unlimited: bool,
    pub boost: bool,
    pub travel: bool,
}

/// Resolves active subscription tiers for users
///
/// Absence of grants, or of the user, is a valid state and yields an empty set.
pub struct SubscriptionEntitlementResolver {
    store: Arc<dyn SubscriptionStore>,
    tiers: TierPolicy,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<CacheManager>>,
}

impl SubscriptionEntitlementResolver {
    pub fn new(store: Arc<dyn SubscriptionStore>, tiers: TierPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tiers,
            clock,
            cache: None,
        }
    }

    /// Read active tier sets through the two-tier cache
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tiers(&self) -> &TierPolicy {
        &self.tiers
    }

    /// Plan ids where the grant is active and unexpired
    pub async fn active_tier_ids(&self, user_id: UserId) -> EngineResult<HashSet<TierId>> {
        let mut tier_sets = self.active_tier_sets(&[user_id]).await?;
        Ok(tier_sets.remove(&user_id).unwrap_or_default())
    }

    pub async fn has_tier(&self, user_id: UserId, tier_id: TierId) -> EngineResult<bool> {
        Ok(self.active_tier_ids(user_id).await?.contains(&tier_id))
    }

    pub async fn entitlements(&self, user_id: UserId) -> EngineResult<Entitlements> {
        let tier_ids = self.active_tier_ids(user_id).await?;
        Ok(self.tiers.summarize(tier_ids))
    }

    /// Subset of `user_ids` currently holding a boost plan.
    /// Reads the same cached tier sets as `entitlements`.
    pub async fn boosted_among(&self, user_ids: &[UserId]) -> EngineResult<HashSet<UserId>> {
        if user_ids.is_empty() || self.tiers.boost.is_empty() {
            return Ok(HashSet::new());
        }

        let boosted = self
            .active_tier_sets(user_ids)
            .await?
            .into_iter()
            .filter(|(_, tier_ids)| !self.tiers.boost.is_disjoint(tier_ids))
            .map(|(user_id, _)| user_id)
            .collect();

        Ok(boosted)
    }

    /// Drop the cached tier set so the next lookup reads the store
    pub async fn invalidate(&self, user_id: UserId) {
        let Some(cache) = &self.cache else {
            return;
        };

        match cache.invalidate(&CacheKey::entitlements(user_id)).await {
            Ok(()) => tracing::debug!("Entitlement cache cleared for {}", user_id),
            Err(e) => tracing::warn!("Entitlement cache invalidation failed for {}: {}", user_id, e),
        }
    }

    /// Tier sets for every requested user; cached users skip the store
    async fn active_tier_sets(
        &self,
        user_ids: &[UserId],
    ) -> EngineResult<HashMap<UserId, HashSet<TierId>>> {
        let mut resolved = HashMap::with_capacity(user_ids.len());
        let mut missing = Vec::new();

        for &user_id in user_ids {
            match self.cached_tier_ids(user_id).await {
                Some(tier_ids) => {
                    resolved.insert(user_id, tier_ids);
                }
                None => missing.push(user_id),
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        let now = self.clock.now();
        let mut fetched: HashMap<UserId, HashSet<TierId>> =
            missing.iter().map(|&user_id| (user_id, HashSet::new())).collect();

        for grant in self.store.active_grants(&missing, now).await? {
            if !grant.is_active_at(now) {
                continue;
            }
            if let Some(tier_ids) = fetched.get_mut(&grant.user_id) {
                tier_ids.insert(grant.plan_id);
            }
        }

        if let Some(cache) = &self.cache {
            for (user_id, tier_ids) in &fetched {
                if let Err(e) = cache.set(&CacheKey::entitlements(*user_id), tier_ids).await {
                    tracing::warn!("Entitlement cache write failed for {}: {}", user_id, e);
                }
            }
        }

        resolved.extend(fetched);
        Ok(resolved)
    }

    async fn cached_tier_ids(&self, user_id: UserId) -> Option<HashSet<TierId>> {
        let cache = self.cache.as_ref()?;

        match cache.get::<HashSet<TierId>>(&CacheKey::entitlements(user_id)).await {
            Ok(tier_ids) => Some(tier_ids),
            Err(CacheError::CacheMiss(_)) => None,
            Err(e) => {
                tracing::warn!("Entitlement cache read failed for {}: {}", user_id, e);
                None
            }
        }
    }
}

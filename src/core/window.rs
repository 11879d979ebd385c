use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::entitlements::{Entitlements, SubscriptionEntitlementResolver};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    SwipeAllowance, SwipeDirection, SwipeEvent, SwipeStats, SwipeUsage, UsageWindow, UserId,
};
use crate::services::SwipeStore;

pub const DEFAULT_WINDOW_HOURS: u32 = 12;

/// How swipes are grouped when counting against the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindowStrategy {
    /// Swipes newer than `now - hours`; decays continuously
    Rolling { hours: u32 },
    /// One counter per UTC calendar day; resets at midnight
    CalendarDay,
}

impl RateWindowStrategy {
    /// Exclusive lower bound of the current window
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RateWindowStrategy::Rolling { hours } => now - Duration::hours(i64::from(*hours)),
            RateWindowStrategy::CalendarDay => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

impl Default for RateWindowStrategy {
    fn default() -> Self {
        RateWindowStrategy::Rolling {
            hours: DEFAULT_WINDOW_HOURS,
        }
    }
}

/// Quota sizes per entitlement class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub base: u32,
    pub boost_bonus: u32,
    /// Sentinel for "effectively unlimited"
    pub unlimited: u32,
}

impl QuotaLimits {
    /// Unlimited wins over boost; boost adds its bonus to the base quota
    pub fn quota_for(&self, entitlements: &Entitlements) -> u32 {
        if entitlements.unlimited {
            self.unlimited
        } else if entitlements.boost {
            self.base.saturating_add(self.boost_bonus)
        } else {
            self.base
        }
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            base: 50,
            boost_bonus: 50,
            unlimited: 999_999,
        }
    }
}

/// Rolling-window swipe rate limiter with tier-based quotas
pub struct SwipeWindowCounter {
    store: Arc<dyn SwipeStore>,
    entitlements: Arc<SubscriptionEntitlementResolver>,
    strategy: RateWindowStrategy,
    limits: QuotaLimits,
    clock: Arc<dyn Clock>,
}

impl SwipeWindowCounter {
    pub fn new(
        store: Arc<dyn SwipeStore>,
        entitlements: Arc<SubscriptionEntitlementResolver>,
        strategy: RateWindowStrategy,
        limits: QuotaLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entitlements,
            strategy,
            limits,
            clock,
        }
    }

    pub fn strategy(&self) -> RateWindowStrategy {
        self.strategy
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Swipe quota for the user's current entitlements.
    /// Unknown users get the free-tier quota.
    pub async fn quota(&self, user_id: UserId) -> EngineResult<u32> {
        let entitlements = self.entitlements.entitlements(user_id).await?;
        Ok(self.limits.quota_for(&entitlements))
    }

    /// Usage inside the configured window
    pub async fn usage(&self, user_id: UserId) -> EngineResult<SwipeUsage> {
        let usage = match self.current_window() {
            UsageWindow::Since(since) => self.store.usage_since(user_id, since).await?,
            UsageWindow::Day(day) => self.store.daily_usage(user_id, day).await?,
        };
        Ok(usage)
    }

    /// The window swipes are counted in right now
    pub fn current_window(&self) -> UsageWindow {
        let now = self.clock.now();
        match self.strategy {
            RateWindowStrategy::Rolling { .. } => UsageWindow::Since(self.strategy.window_start(now)),
            RateWindowStrategy::CalendarDay => UsageWindow::Day(now.date_naive()),
        }
    }

    /// Usage over an explicit rolling window of `hours`
    pub async fn usage_in_window(&self, user_id: UserId, hours: u32) -> EngineResult<SwipeUsage> {
        let since = RateWindowStrategy::Rolling { hours }.window_start(self.clock.now());
        Ok(self.store.usage_since(user_id, since).await?)
    }

    /// Calendar-day counter, kept for history and analytics
    pub async fn daily_usage(&self, user_id: UserId, day: NaiveDate) -> EngineResult<SwipeUsage> {
        Ok(self.store.daily_usage(user_id, day).await?)
    }

    pub async fn remaining(&self, user_id: UserId) -> EngineResult<u32> {
        let quota = self.quota(user_id).await?;
        let usage = self.usage(user_id).await?;
        Ok(quota.saturating_sub(usage.total))
    }

    pub async fn can_swipe(&self, user_id: UserId) -> EngineResult<bool> {
        Ok(self.remaining(user_id).await? > 0)
    }

    /// Fails with `QuotaExceeded` when nothing is left.
    ///
    /// The returned allowance lets the store repeat the check inside the
    /// write that consumes the swipe.
    pub async fn ensure_can_swipe(&self, user_id: UserId) -> EngineResult<SwipeAllowance> {
        let quota = self.quota(user_id).await?;
        let usage = self.usage(user_id).await?;

        if usage.total >= quota {
            return Err(self.quota_exceeded(user_id, usage.total, quota).await);
        }

        Ok(SwipeAllowance {
            window: self.current_window(),
            limit: quota,
        })
    }

    /// `QuotaExceeded` carrying the user's reset time
    pub async fn quota_exceeded(&self, user_id: UserId, used: u32, limit: u32) -> EngineError {
        let resets_at = match self.resets_at(user_id).await {
            Ok(resets_at) => resets_at,
            Err(e) => return e,
        };
        tracing::info!(
            "User {} hit swipe quota ({} of {}), resets at {:?}",
            user_id,
            used,
            limit,
            resets_at
        );
        EngineError::QuotaExceeded { limit, resets_at }
    }

    /// Record one swipe. Not idempotent: each call appends a new event.
    pub async fn record_swipe(&self, user_id: UserId, direction: SwipeDirection) -> EngineResult<()> {
        let event = SwipeEvent {
            user_id,
            direction,
            created_at: self.clock.now(),
        };
        self.store.append_swipe(&event).await?;

        tracing::debug!("Recorded {} swipe for user {}", direction, user_id);
        Ok(())
    }

    /// When the oldest swipe in the window stops counting, or `None` with no usage
    pub async fn resets_at(&self, user_id: UserId) -> EngineResult<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        match self.strategy {
            RateWindowStrategy::Rolling { hours } => {
                let oldest = self
                    .store
                    .oldest_since(user_id, self.strategy.window_start(now))
                    .await?;
                Ok(oldest.map(|at| at + Duration::hours(i64::from(hours))))
            }
            RateWindowStrategy::CalendarDay => {
                let today = self.store.daily_usage(user_id, now.date_naive()).await?;
                if today.total == 0 {
                    return Ok(None);
                }
                Ok(now
                    .date_naive()
                    .succ_opt()
                    .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN).and_utc()))
            }
        }
    }

    /// Everything the swipe-stats endpoint reports
    pub async fn stats(&self, user_id: UserId) -> EngineResult<SwipeStats> {
        let entitlements = self.entitlements.entitlements(user_id).await?;
        let quota = self.limits.quota_for(&entitlements);
        let usage = self.usage(user_id).await?;
        let resets_at = self.resets_at(user_id).await?;

        Ok(SwipeStats {
            total_swipes: usage.total,
            left_swipes: usage.left,
            right_swipes: usage.right,
            super_likes: usage.super_likes,
            swipe_limit: quota,
            remaining_swipes: quota.saturating_sub(usage.total),
            resets_at,
            has_boost: entitlements.boost,
        })
    }
}

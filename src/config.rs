use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::entitlements::{
    TierPolicy, DEFAULT_BOOST_TIERS, DEFAULT_TRAVEL_TIERS, DEFAULT_UNLIMITED_TIERS,
};
use crate::core::graph::{ExclusionPolicy, LookupFailurePolicy};
use crate::core::selector::DiscoverySettings;
use crate::core::window::{QuotaLimits, RateWindowStrategy, DEFAULT_WINDOW_HOURS};
use crate::models::{ScoringWeights, TierId, UserId};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub swipes: SwipeSettings,
    #[serde(default)]
    pub tiers: TierSettings,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Entitlement cache; disabled when no Redis URL is set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Rolling,
    CalendarDay,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwipeSettings {
    #[serde(default = "default_base_quota")]
    pub base_quota: u32,
    #[serde(default = "default_boost_bonus")]
    pub boost_bonus: u32,
    #[serde(default = "default_unlimited_quota")]
    pub unlimited_quota: u32,
    #[serde(default = "default_window")]
    pub window: WindowKind,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl Default for SwipeSettings {
    fn default() -> Self {
        Self {
            base_quota: default_base_quota(),
            boost_bonus: default_boost_bonus(),
            unlimited_quota: default_unlimited_quota(),
            window: default_window(),
            window_hours: default_window_hours(),
        }
    }
}

fn default_base_quota() -> u32 { 50 }
fn default_boost_bonus() -> u32 { 50 }
fn default_unlimited_quota() -> u32 { 999_999 }
fn default_window() -> WindowKind { WindowKind::Rolling }
fn default_window_hours() -> u32 { DEFAULT_WINDOW_HOURS }

impl SwipeSettings {
    pub fn limits(&self) -> QuotaLimits {
        QuotaLimits {
            base: self.base_quota,
            boost_bonus: self.boost_bonus,
            unlimited: self.unlimited_quota,
        }
    }

    pub fn strategy(&self) -> RateWindowStrategy {
        match self.window {
            WindowKind::Rolling => RateWindowStrategy::Rolling {
                hours: self.window_hours,
            },
            WindowKind::CalendarDay => RateWindowStrategy::CalendarDay,
        }
    }
}

/// Plan ids granting each perk
#[derive(Debug, Clone, Deserialize)]
pub struct TierSettings {
    #[serde(default = "default_unlimited_tiers")]
    pub unlimited: Vec<TierId>,
    #[serde(default = "default_boost_tiers")]
    pub boost: Vec<TierId>,
    #[serde(default = "default_travel_tiers")]
    pub travel: Vec<TierId>,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            unlimited: default_unlimited_tiers(),
            boost: default_boost_tiers(),
            travel: default_travel_tiers(),
        }
    }
}

fn default_unlimited_tiers() -> Vec<TierId> { DEFAULT_UNLIMITED_TIERS.to_vec() }
fn default_boost_tiers() -> Vec<TierId> { DEFAULT_BOOST_TIERS.to_vec() }
fn default_travel_tiers() -> Vec<TierId> { DEFAULT_TRAVEL_TIERS.to_vec() }

impl TierSettings {
    pub fn policy(&self) -> TierPolicy {
        TierPolicy::new(
            self.unlimited.iter().copied(),
            self.boost.iter().copied(),
            self.travel.iter().copied(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    #[serde(default = "default_min_candidate_id")]
    pub min_candidate_id: UserId,
    #[serde(default = "default_boost_slots")]
    pub boost_slots: usize,
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_gate_on_quota")]
    pub gate_on_quota: bool,
    #[serde(default = "default_swiped_lookup")]
    pub swiped_lookup: LookupFailurePolicy,
    #[serde(default = "default_blocked_lookup")]
    pub blocked_lookup: LookupFailurePolicy,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            min_candidate_id: default_min_candidate_id(),
            boost_slots: default_boost_slots(),
            oversample_factor: default_oversample_factor(),
            max_batch: default_max_batch(),
            pool_size: default_pool_size(),
            gate_on_quota: default_gate_on_quota(),
            swiped_lookup: default_swiped_lookup(),
            blocked_lookup: default_blocked_lookup(),
        }
    }
}

fn default_min_candidate_id() -> UserId { 10 }
fn default_boost_slots() -> usize { 5 }
fn default_oversample_factor() -> usize { 3 }
fn default_max_batch() -> usize { 50 }
fn default_pool_size() -> usize { 200 }
fn default_gate_on_quota() -> bool { true }
fn default_swiped_lookup() -> LookupFailurePolicy { LookupFailurePolicy::FailOpen }
fn default_blocked_lookup() -> LookupFailurePolicy { LookupFailurePolicy::FailClosed }

impl DiscoverySection {
    pub fn settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            min_candidate_id: self.min_candidate_id,
            boost_slots: self.boost_slots,
            oversample_factor: self.oversample_factor.max(1),
            max_batch: self.max_batch,
            pool_size: self.pool_size,
            gate_on_quota: self.gate_on_quota,
        }
    }

    pub fn exclusion_policy(&self) -> ExclusionPolicy {
        ExclusionPolicy {
            swiped: self.swiped_lookup,
            blocked: self.blocked_lookup,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_social_circles_weight")]
    pub social_circles: f64,
    #[serde(default = "default_country_weight")]
    pub country: f64,
    #[serde(default = "default_age_close_weight")]
    pub age_close: f64,
    #[serde(default = "default_age_near_weight")]
    pub age_near: f64,
    #[serde(default = "default_interests_weight")]
    pub interests: f64,
    #[serde(default = "default_age_close_years")]
    pub age_close_years: u32,
    #[serde(default = "default_age_near_years")]
    pub age_near_years: u32,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            social_circles: default_social_circles_weight(),
            country: default_country_weight(),
            age_close: default_age_close_weight(),
            age_near: default_age_near_weight(),
            interests: default_interests_weight(),
            age_close_years: default_age_close_years(),
            age_near_years: default_age_near_years(),
        }
    }
}

fn default_social_circles_weight() -> f64 { 0.4 }
fn default_country_weight() -> f64 { 0.3 }
fn default_age_close_weight() -> f64 { 0.2 }
fn default_age_near_weight() -> f64 { 0.1 }
fn default_interests_weight() -> f64 { 0.1 }
fn default_age_close_years() -> u32 { 5 }
fn default_age_near_years() -> u32 { 10 }

impl From<&WeightsConfig> for ScoringWeights {
    fn from(config: &WeightsConfig) -> Self {
        ScoringWeights {
            social_circles: config.social_circles,
            country: config.country,
            age_close: config.age_close,
            age_near: config.age_near,
            interests: config.interests,
            age_close_years: config.age_close_years,
            age_near_years: config.age_near_years,
        }
    }
}

/// Push notifications; logged only when no webhook is set
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

fn default_notify_timeout() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. `config/default.toml`
    /// 2. `config/local.toml`
    /// 3. Environment variables, e.g. `CIRCLE__SWIPES__BASE_QUOTA` -> swipes.base_quota
    /// 4. `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment());

        with_database_url(builder)?.build()?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CIRCLE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// `DATABASE_URL` wins over anything in the files
fn with_database_url(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => builder.set_override("database.url", url),
        Err(_) => Ok(builder),
    }
}

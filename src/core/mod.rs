// Core engine exports
pub mod clock;
pub mod entitlements;
pub mod filters;
pub mod graph;
pub mod scoring;
pub mod selector;
pub mod window;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entitlements::{Entitlements, SubscriptionEntitlementResolver, TierPolicy};
pub use filters::{apply_filters, matches_query_constraints};
pub use graph::{ConnectionGraphQuery, ExclusionPolicy, LookupFailurePolicy};
pub use scoring::CompatibilityScorer;
pub use selector::{arrange_with_boost_priority, CandidateSelector, DiscoverySettings};
pub use window::{QuotaLimits, RateWindowStrategy, SwipeWindowCounter};
pub use workflow::ConnectionRequestWorkflow;

//! circle-match - swipe quotas and matching eligibility for the Circles app
//!
//! Enforces tiered, time-windowed swipe quotas and decides which users may
//! appear in a requester's discovery feed. Connection requests move through
//! `pending -> accepted | rejected -> disconnected`, each send consuming one
//! swipe.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    CandidateSelector, CompatibilityScorer, ConnectionGraphQuery, ConnectionRequestWorkflow,
    SubscriptionEntitlementResolver, SwipeWindowCounter,
};
pub use error::{EngineError, EngineResult};
pub use models::{ConnectionRequest, RequestStatus, RequestType, SwipeStats, UserProfile};

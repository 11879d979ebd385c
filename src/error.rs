use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{RequestId, RequestStatus};
use crate::services::StoreError;

/// Errors reported by engine operations
///
/// Permission mismatches and missing rows are not errors; operations report
/// those as `false` / `None`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Swipe quota of {limit} exceeded")]
    QuotaExceeded {
        limit: u32,
        resets_at: Option<DateTime<Utc>>,
    },

    #[error("A connection request already exists (id {request_id}, status {status})")]
    DuplicateRequest {
        request_id: RequestId,
        status: RequestStatus,
    },

    #[error("Cannot send a connection request to yourself")]
    SelfRequest,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// Stable identifier used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::QuotaExceeded { .. } => "quota_exceeded",
            EngineError::DuplicateRequest { .. } => "duplicate",
            EngineError::SelfRequest => "self_request",
            EngineError::Persistence(_) => "internal_error",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

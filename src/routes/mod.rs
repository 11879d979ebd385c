// Route exports
pub mod connections;
pub mod discover;
pub mod entitlements;

use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::ValidationErrors;

use crate::core::{
    CandidateSelector, ConnectionGraphQuery, ConnectionRequestWorkflow,
    SubscriptionEntitlementResolver, SwipeWindowCounter,
};
use crate::error::EngineError;
use crate::models::{DuplicateResponse, ErrorResponse, HealthResponse, QuotaExceededResponse};
use crate::services::PostgresStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub entitlements: Arc<SubscriptionEntitlementResolver>,
    pub swipes: Arc<SwipeWindowCounter>,
    pub graph: Arc<ConnectionGraphQuery>,
    pub selector: CandidateSelector,
    pub workflow: Arc<ConnectionRequestWorkflow>,
    /// Absent when running on the in-memory store
    pub database: Option<Arc<PostgresStore>>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api/v1")
            .configure(connections::configure)
            .configure(discover::configure)
            .configure(entitlements::configure),
    );
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.database {
        Some(db) => db.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Map an engine failure onto its HTTP response
pub(crate) fn engine_error_response(err: &EngineError) -> HttpResponse {
    match err {
        EngineError::QuotaExceeded { limit, resets_at } => {
            HttpResponse::TooManyRequests().json(QuotaExceededResponse {
                error: err.code().to_string(),
                swipe_limit: *limit,
                remaining_swipes: 0,
                resets_at: *resets_at,
            })
        }
        EngineError::DuplicateRequest { request_id, status } => {
            HttpResponse::Conflict().json(DuplicateResponse {
                error: err.code().to_string(),
                request_id: *request_id,
                status: *status,
            })
        }
        EngineError::SelfRequest => HttpResponse::BadRequest().json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
            status_code: 400,
        }),
        EngineError::Persistence(e) => {
            tracing::error!("Persistence failure: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: err.code().to_string(),
                message: "Internal server error".to_string(),
                status_code: 500,
            })
        }
    }
}

pub(crate) fn validation_error_response(errors: ValidationErrors) -> HttpResponse {
    tracing::info!("Validation failed: {:?}", errors);
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "validation_failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

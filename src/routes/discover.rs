use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{
    DiscoverFilters, DiscoverMode, DiscoverQuery, DiscoverResponse, RecommendationsResponse,
    UserQuery,
};
use crate::routes::{engine_error_response, validation_error_response, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/discover", web::get().to(discover))
        .route("/recommendations", web::get().to(recommendations));
}

/// Browse candidates
///
/// GET /api/v1/discover?userId=1&socialCircleIds=3,4&countryId=7&limit=20&mode=latest
async fn discover(state: web::Data<AppState>, query: web::Query<DiscoverQuery>) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_error_response(errors);
    }

    let filters = DiscoverFilters {
        social_circle_ids: query.circle_ids(),
        country_id: query.country_id,
    };
    let limit = query.limit as usize;

    tracing::info!(
        "Discover for user {} (mode: {:?}, limit: {})",
        query.user_id,
        query.mode,
        limit
    );

    let result = match query.mode {
        DiscoverMode::Random => state.selector.discover(query.user_id, &filters, limit).await,
        DiscoverMode::Latest => {
            state
                .selector
                .discover_latest_with_boost_priority(query.user_id, &filters, limit)
                .await
        }
    };

    match result {
        Ok(candidates) => HttpResponse::Ok().json(DiscoverResponse {
            total_results: candidates.len(),
            candidates,
        }),
        Err(e) => engine_error_response(&e),
    }
}

async fn recommendations(
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_error_response(errors);
    }

    match state
        .selector
        .recommendations_by_compatibility(query.user_id, query.limit as usize)
        .await
    {
        Ok(candidates) => HttpResponse::Ok().json(RecommendationsResponse {
            total_results: candidates.len(),
            candidates,
        }),
        Err(e) => engine_error_response(&e),
    }
}

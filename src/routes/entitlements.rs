use actix_web::{web, HttpResponse, Responder};

use crate::models::{EntitlementsResponse, UserId};
use crate::routes::{engine_error_response, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/entitlements/{user_id}/refresh", web::post().to(refresh));
}

/// Re-read a user's plans after a purchase or cancellation
///
/// POST /api/v1/entitlements/{user_id}/refresh
async fn refresh(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();
    state.entitlements.invalidate(user_id).await;

    match state.entitlements.entitlements(user_id).await {
        Ok(entitlements) => {
            tracing::info!("Entitlements refreshed for {}: {:?}", user_id, entitlements.tier_ids);
            let mut tier_ids: Vec<_> = entitlements.tier_ids.into_iter().collect();
            tier_ids.sort_unstable();
            HttpResponse::Ok().json(EntitlementsResponse {
                user_id,
                tier_ids,
                unlimited: entitlements.unlimited,
                boost: entitlements.boost,
                travel: entitlements.travel,
            })
        }
        Err(e) => engine_error_response(&e),
    }
}

use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::models::{
    DisconnectRequest, PendingRequestsResponse, RequestId, RespondRequest, SwipeRequest,
    SwipeResponse, TransitionResponse, UserQuery,
};
use crate::routes::{engine_error_response, validation_error_response, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/connections/swipe", web::post().to(swipe))
        .route("/connections/swipe-stats", web::get().to(swipe_stats))
        .route("/connections/pending", web::get().to(pending_requests))
        .route("/connections/disconnect", web::post().to(disconnect))
        .route("/connections/{id}/accept", web::post().to(accept))
        .route("/connections/{id}/reject", web::post().to(reject));
}

/// Swipe on a user
///
/// POST /api/v1/connections/swipe
///
/// ```json
/// { "userId": 1, "targetUserId": 2, "requestType": "right_swipe" }
/// ```
async fn swipe(state: web::Data<AppState>, req: web::Json<SwipeRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_error_response(errors);
    }

    let req = req.into_inner();
    tracing::info!(
        "Swipe from {} on {} ({})",
        req.user_id,
        req.target_user_id,
        req.request_type.as_str()
    );

    match state
        .workflow
        .send_request(
            req.user_id,
            req.target_user_id,
            req.social_circle_id,
            req.request_type,
            req.message,
        )
        .await
    {
        Ok(request_id) => HttpResponse::Created().json(SwipeResponse { request_id }),
        Err(e) => engine_error_response(&e),
    }
}

async fn swipe_stats(state: web::Data<AppState>, query: web::Query<UserQuery>) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_error_response(errors);
    }

    match state.swipes.stats(query.user_id).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => engine_error_response(&e),
    }
}

async fn pending_requests(
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_error_response(errors);
    }

    match state.graph.pending_requests_for(query.user_id).await {
        Ok(mut requests) => {
            requests.truncate(query.limit as usize);
            HttpResponse::Ok().json(PendingRequestsResponse {
                total_results: requests.len(),
                requests,
            })
        }
        Err(e) => engine_error_response(&e),
    }
}

async fn accept(
    state: web::Data<AppState>,
    path: web::Path<RequestId>,
    body: web::Json<RespondRequest>,
) -> impl Responder {
    if let Err(errors) = body.validate() {
        return validation_error_response(errors);
    }

    match state.workflow.accept(path.into_inner(), body.user_id).await {
        Ok(success) => HttpResponse::Ok().json(TransitionResponse { success }),
        Err(e) => engine_error_response(&e),
    }
}

async fn reject(
    state: web::Data<AppState>,
    path: web::Path<RequestId>,
    body: web::Json<RespondRequest>,
) -> impl Responder {
    if let Err(errors) = body.validate() {
        return validation_error_response(errors);
    }

    match state.workflow.reject(path.into_inner(), body.user_id).await {
        Ok(success) => HttpResponse::Ok().json(TransitionResponse { success }),
        Err(e) => engine_error_response(&e),
    }
}

async fn disconnect(
    state: web::Data<AppState>,
    body: web::Json<DisconnectRequest>,
) -> impl Responder {
    if let Err(errors) = body.validate() {
        return validation_error_response(errors);
    }

    match state
        .workflow
        .disconnect(body.user_id, body.other_user_id)
        .await
    {
        Ok(success) => HttpResponse::Ok().json(TransitionResponse { success }),
        Err(e) => engine_error_response(&e),
    }
}

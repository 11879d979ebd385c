use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use circle_match::config::Settings;
use circle_match::core::{
    CandidateSelector, Clock, CompatibilityScorer, ConnectionGraphQuery,
    ConnectionRequestWorkflow, SubscriptionEntitlementResolver, SwipeWindowCounter, SystemClock,
};
use circle_match::models::{ErrorResponse, ScoringWeights};
use circle_match::routes::{self, AppState};
use circle_match::services::{
    CacheManager, LogNotifier, NotificationDispatcher, PostgresStore, WebhookNotifier,
};

/// JSON body for extractor failures
#[derive(Debug)]
struct JsonError(ErrorResponse);

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.0.error, self.0.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::BAD_REQUEST),
        )
        .json(&self.0)
    }
}

fn handle_json_payload_error(
    err: error::JsonPayloadError,
    req: &actix_web::HttpRequest,
) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError(ErrorResponse {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    })
    .into()
}

fn handle_query_payload_error(
    err: error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    JsonError(ErrorResponse {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    })
    .into()
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());
    init_tracing(&log_level, &log_format);
    info!("Starting circle-match service...");

    let store = Arc::new(
        PostgresStore::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            std::io::Error::other(format!("PostgreSQL connection error: {}", e))
        })?,
    );
    info!("PostgreSQL store initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut resolver = SubscriptionEntitlementResolver::new(
        store.clone(),
        settings.tiers.policy(),
        clock.clone(),
    );

    // The entitlement cache is optional; lookups go straight to PostgreSQL without it
    if let Some(redis_url) = &settings.cache.redis_url {
        let ttl = settings.cache.ttl_secs.unwrap_or(60);
        let l1_size = settings.cache.l1_cache_size.unwrap_or(10_000);

        match CacheManager::new(redis_url, l1_size, ttl).await {
            Ok(cache) => {
                info!("Entitlement cache enabled (L1: {} entries, TTL: {}s)", l1_size, ttl);
                resolver = resolver.with_cache(Arc::new(cache));
            }
            Err(e) => warn!("Failed to connect to Redis ({}), running without cache", e),
        }
    }
    let resolver = Arc::new(resolver);

    let swipes = Arc::new(SwipeWindowCounter::new(
        store.clone(),
        resolver.clone(),
        settings.swipes.strategy(),
        settings.swipes.limits(),
        clock.clone(),
    ));
    info!(
        "Swipe window: {:?}, limits: {:?}",
        swipes.strategy(),
        swipes.limits()
    );

    let graph = Arc::new(ConnectionGraphQuery::new(store.clone(), store.clone()));

    let weights = ScoringWeights::from(&settings.scoring.weights);
    let selector = CandidateSelector::new(
        store.clone(),
        graph.clone(),
        swipes.clone(),
        resolver.clone(),
        CompatibilityScorer::new(weights),
        settings.discovery.settings(),
        clock.clone(),
    )
    .with_policy(settings.discovery.exclusion_policy());

    let notifier: Arc<dyn NotificationDispatcher> = match &settings.notifications.webhook_url {
        Some(url) => match WebhookNotifier::new(url.clone(), settings.notifications.timeout_secs) {
            Ok(webhook) => Arc::new(webhook),
            Err(e) => {
                warn!("Failed to build webhook notifier ({}), logging notifications", e);
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let workflow = Arc::new(ConnectionRequestWorkflow::new(
        store.clone(),
        graph.clone(),
        swipes.clone(),
        notifier,
        clock,
    ));

    let app_state = AppState {
        entitlements: resolver,
        swipes,
        graph,
        selector,
        workflow,
        database: Some(store),
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}

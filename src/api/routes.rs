//! API Routes
//!
//! Configures the Axum router with all gateway endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_metrics_handler, cache_query_handler, eas_passthrough_handler, ens_handler,
    health_handler, metrics_handler, registry_handler, talent_profile_handler,
    talent_score_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /api/cache/metrics` - EAS cache metrics
/// - `GET /api/cache/metrics/:cache` - Metrics of the `eas`, `ens` or `talent` cache
/// - `POST /api/cache` - Cached EAS GraphQL query
/// - `POST /api/eas` - Uncached EAS GraphQL passthrough
/// - `POST /api/ens` - Batch ENS reverse resolution
/// - `GET /api/talent` - Talent builder score
/// - `GET /api/talent/profile` - Talent profile
/// - `GET /api/registry` - Aggregated and enriched builder registry
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/cache", post(cache_query_handler))
        .route("/api/cache/metrics", get(metrics_handler))
        .route("/api/cache/metrics/:cache", get(cache_metrics_handler))
        .route("/api/eas", post(eas_passthrough_handler))
        .route("/api/ens", post(ens_handler))
        .route("/api/talent", get(talent_score_handler))
        .route("/api/talent/profile", get(talent_profile_handler))
        .route("/api/registry", get(registry_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

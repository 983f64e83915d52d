//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStatus, MetricsSnapshot};
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::models::{
    AddressQuery, CacheQueryRequest, CacheQueryResponse, EnsBatchMetrics, EnsRequest, EnsResponse,
    HealthResponse, QueryPerformance, TalentProfileResponse, TalentScoreResponse,
};
use crate::registry::{self, Registry};
use crate::resilience::BatchOrchestrator;
use crate::services::{
    normalize_address, EasClient, EasService, EnsResolver, TalentClient, UpstreamHttp,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub eas: Arc<EasService>,
    pub ens: Arc<EnsResolver>,
    pub talent: Arc<TalentClient>,
    /// Cancelled on shutdown; stops running batches
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates a new AppState over already built services.
    pub fn new(eas: EasService, ens: EnsResolver, talent: TalentClient) -> Self {
        Self {
            eas: Arc::new(eas),
            ens: Arc::new(ens),
            talent: Arc::new(talent),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// All upstream clients share one HTTP client, retry policy and batch
    /// policy.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = UpstreamHttp::new(config.request_timeout())?;
        let retry = config.retry_policy();
        let batch = BatchOrchestrator::new(config.batch_policy());

        let eas = EasService::new(
            EasClient::new(http.clone(), config.eas_graphql_url.clone(), retry),
            Duration::from_secs(config.eas_cache_ttl),
            Duration::from_secs(config.eas_stale_window),
        );
        let ens = EnsResolver::from_urls(
            &config.rpc_endpoints,
            &http,
            batch,
            Duration::from_secs(config.ens_cache_ttl),
        )?;
        let talent = TalentClient::new(
            http,
            config.talent_api_url.clone(),
            config.talent_api_key.clone(),
            retry,
            Duration::from_secs(config.talent_cache_ttl),
            batch,
        );

        Ok(Self::new(eas, ens, talent))
    }

    /// Metrics of the named cache: `eas`, `ens` or `talent`.
    pub fn metrics_for(&self, cache: &str) -> Option<MetricsSnapshot> {
        match cache {
            "eas" => Some(self.eas.metrics().snapshot()),
            "ens" => Some(self.ens.metrics().snapshot()),
            "talent" => Some(self.talent.metrics().snapshot()),
            _ => None,
        }
    }

    /// Cancels running batches and background refreshes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.eas.cache().shutdown();
        self.ens.cache().shutdown();
        self.talent.profile_cache().shutdown();
        self.talent.score_cache().shutdown();
    }
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GatewayError::InvalidRequest(rejection.body_text()))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /api/cache/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.eas.metrics().snapshot())
}

/// Handler for GET /api/cache/metrics/:cache
pub async fn cache_metrics_handler(
    State(state): State<AppState>,
    Path(cache): Path<String>,
) -> Result<Json<MetricsSnapshot>> {
    state
        .metrics_for(&cache)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown cache: {cache}")))
}

/// Handler for POST /api/cache
///
/// Runs an EAS query through the stale-while-revalidate cache and reports
/// how it was served in the `X-Cache-*` headers.
pub async fn cache_query_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CacheQueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let start = Instant::now();
    let query = json_body(payload)?.into_query()?;

    let cached = state.eas.cached_query(&query).await?;
    let body = CacheQueryResponse {
        data: cached.value.get("data").cloned().unwrap_or(Value::Null),
        performance: QueryPerformance {
            latency_ms: elapsed_ms(start),
            cached: cached.status != CacheStatus::Miss,
        },
    };

    let headers = [
        ("x-cache-status", cached.status.as_str().to_string()),
        ("x-cache-timestamp", cached.created_at.to_rfc3339()),
        ("x-cache-ttl", cached.ttl.as_secs().to_string()),
        ("x-cache-age", cached.age.as_secs().to_string()),
    ];
    Ok((headers, Json(body)))
}

/// Handler for POST /api/eas
///
/// Forwards the GraphQL body upstream without caching.
pub async fn eas_passthrough_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = json_body(payload)?;
    let response = state.eas.client().execute(&body).await?;
    Ok(Json(response))
}

/// Handler for POST /api/ens
pub async fn ens_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EnsRequest>, JsonRejection>,
) -> Result<Json<EnsResponse>> {
    let start = Instant::now();
    let request = json_body(payload)?;

    let unique: HashSet<String> = request
        .addresses
        .iter()
        .filter_map(|a| normalize_address(a))
        .collect();
    let ens_map = state.ens.resolve_all(&request.addresses, &state.shutdown).await;

    let metrics = EnsBatchMetrics {
        requested: request.addresses.len(),
        unique: unique.len(),
        resolved: ens_map.len(),
        latency_ms: elapsed_ms(start),
    };
    Ok(Json(EnsResponse { ens_map, metrics }))
}

/// Handler for GET /api/talent
pub async fn talent_score_handler(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<TalentScoreResponse>> {
    let address = query.into_address()?;
    let score = state.talent.score(&address).await?;
    Ok(Json(TalentScoreResponse { score }))
}

/// Handler for GET /api/talent/profile
pub async fn talent_profile_handler(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<TalentProfileResponse>> {
    let address = query.into_address()?;
    let profile = state.talent.profile(&address).await?;
    Ok(Json(TalentProfileResponse { profile }))
}

/// Handler for GET /api/registry
pub async fn registry_handler(State(state): State<AppState>) -> Result<Json<Registry>> {
    let registry = registry::load(&state.eas, &state.ens, &state.talent, &state.shutdown).await?;
    Ok(Json(registry))
}

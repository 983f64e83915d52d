//! Response DTOs for the gateway API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::services::TalentProfile;

/// Response body for POST /api/cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheQueryResponse {
    /// The `data` object of the GraphQL answer
    pub data: Value,
    pub performance: QueryPerformance,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPerformance {
    pub latency_ms: u64,
    /// True when served from cache, fresh or stale
    pub cached: bool,
}

/// Response body for POST /api/ens
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsResponse {
    pub ens_map: HashMap<String, String>,
    pub metrics: EnsBatchMetrics,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsBatchMetrics {
    pub requested: usize,
    pub unique: usize,
    pub resolved: usize,
    pub latency_ms: u64,
}

/// Response body for GET /api/talent
#[derive(Debug, Clone, Serialize)]
pub struct TalentScoreResponse {
    pub score: Option<f64>,
}

/// Response body for GET /api/talent/profile; `{}` without a profile
#[derive(Debug, Clone, Serialize)]
pub struct TalentProfileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<TalentProfile>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_query_response_serialize() {
        let resp = CacheQueryResponse {
            data: json!({"attestations": []}),
            performance: QueryPerformance {
                latency_ms: 12,
                cached: true,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["performance"]["latencyMs"], 12);
        assert_eq!(json["performance"]["cached"], true);
    }

    #[test]
    fn test_ens_response_serialize() {
        let resp = EnsResponse {
            ens_map: HashMap::from([("0xabc".to_string(), "abc.eth".to_string())]),
            metrics: EnsBatchMetrics {
                requested: 2,
                unique: 1,
                resolved: 1,
                latency_ms: 5,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ensMap"]["0xabc"], "abc.eth");
        assert_eq!(json["metrics"]["latencyMs"], 5);
    }

    #[test]
    fn test_missing_profile_serializes_empty() {
        let resp = TalentProfileResponse { profile: None };
        assert_eq!(serde_json::to_string(&resp).unwrap(), "{}");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}

//! Configuration Module
//!
//! Handles loading and managing gateway configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::resilience::{Backoff, BatchPolicy, RetryPolicy};

/// Default ENS-capable JSON-RPC endpoints, tried in order.
pub const DEFAULT_RPC_ENDPOINTS: [&str; 3] = [
    "https://eth.llamarpc.com",
    "https://rpc.ankr.com/eth",
    "https://ethereum.publicnode.com",
];

/// Gateway configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// EAS GraphQL endpoint
    pub eas_graphql_url: String,
    /// Seconds an EAS result is fresh
    pub eas_cache_ttl: u64,
    /// Seconds an EAS result may still be served while revalidating
    pub eas_stale_window: u64,
    /// ENS JSON-RPC endpoints, in fallback order
    pub rpc_endpoints: Vec<String>,
    /// Seconds a resolved ENS name is cached
    pub ens_cache_ttl: u64,
    /// Talent Protocol API base URL
    pub talent_api_url: String,
    /// Talent Protocol API key, sent as `X-API-KEY`
    pub talent_api_key: Option<String>,
    /// Seconds a Talent profile/score is cached
    pub talent_cache_ttl: u64,
    /// Hard timeout for every upstream request, in milliseconds
    pub request_timeout_ms: u64,
    /// Total attempts per upstream call
    pub retry_max_attempts: u32,
    /// Delay between attempts, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Use exponential instead of fixed backoff
    pub retry_exponential: bool,
    /// Keys per batch chunk
    pub batch_size: usize,
    /// Delay between batch chunks, in milliseconds
    pub batch_delay_ms: u64,
    /// Seconds between purge sweeps of fully expired entries
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `EAS_GRAPHQL_URL` - EAS GraphQL endpoint (default: Base mainnet easscan)
    /// - `EAS_CACHE_TTL` / `EAS_STALE_WINDOW` - seconds (default: 300 / 3600)
    /// - `RPC_ENDPOINTS` - comma-separated JSON-RPC URLs
    /// - `ENS_CACHE_TTL` - seconds (default: 86400)
    /// - `TALENT_API_URL` / `TALENT_API_KEY` / `TALENT_CACHE_TTL`
    /// - `REQUEST_TIMEOUT_MS` - per-request timeout (default: 5000)
    /// - `RETRY_MAX_ATTEMPTS` / `RETRY_BASE_DELAY_MS` / `RETRY_EXPONENTIAL`
    /// - `BATCH_SIZE` / `BATCH_DELAY_MS` - batch orchestration (default: 50 / 500)
    /// - `CLEANUP_INTERVAL` - purge frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rpc_endpoints = env::var("RPC_ENDPOINTS")
            .ok()
            .map(|v| parse_endpoint_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.rpc_endpoints);

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            eas_graphql_url: env::var("EAS_GRAPHQL_URL").unwrap_or(defaults.eas_graphql_url),
            eas_cache_ttl: env_or("EAS_CACHE_TTL", defaults.eas_cache_ttl),
            eas_stale_window: env_or("EAS_STALE_WINDOW", defaults.eas_stale_window),
            rpc_endpoints,
            ens_cache_ttl: env_or("ENS_CACHE_TTL", defaults.ens_cache_ttl),
            talent_api_url: env::var("TALENT_API_URL").unwrap_or(defaults.talent_api_url),
            talent_api_key: env::var("TALENT_API_KEY").ok().filter(|k| !k.is_empty()),
            talent_cache_ttl: env_or("TALENT_CACHE_TTL", defaults.talent_cache_ttl),
            request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            retry_exponential: env_or("RETRY_EXPONENTIAL", defaults.retry_exponential),
            batch_size: env_or("BATCH_SIZE", defaults.batch_size),
            batch_delay_ms: env_or("BATCH_DELAY_MS", defaults.batch_delay_ms),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// Retry policy shared by every upstream client.
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = if self.retry_exponential {
            Backoff::Exponential
        } else {
            Backoff::Fixed
        };
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            backoff,
        )
    }

    /// Batch policy used for ENS and Talent bulk lookups.
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::new(self.batch_size, Duration::from_millis(self.batch_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            eas_graphql_url: "https://base.easscan.org/graphql".to_string(),
            eas_cache_ttl: 300,
            eas_stale_window: 3600,
            rpc_endpoints: DEFAULT_RPC_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            ens_cache_ttl: 86_400,
            talent_api_url: "https://api.talentprotocol.com".to_string(),
            talent_api_key: None,
            talent_cache_ttl: 86_400,
            request_timeout_ms: 5000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 1000,
            retry_exponential: false,
            batch_size: 50,
            batch_delay_ms: 500,
            cleanup_interval: 60,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.eas_cache_ttl, 300);
        assert_eq!(config.ens_cache_ttl, 86_400);
        assert_eq!(config.rpc_endpoints.len(), 3);
        assert_eq!(config.retry_max_attempts, 4);
        assert_eq!(config.batch_size, 50);
        assert!(config.talent_api_key.is_none());
    }

    #[test]
    fn test_parse_endpoint_list() {
        let list = parse_endpoint_list(" https://a.example , ,https://b.example,");
        assert_eq!(list, vec!["https://a.example", "https://b.example"]);
        assert!(parse_endpoint_list(" , ").is_empty());
    }

    #[test]
    fn test_derived_policies() {
        let config = Config {
            retry_exponential: true,
            batch_size: 10,
            ..Config::default()
        };
        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(retry.backoff(), Backoff::Exponential);
        assert_eq!(config.batch_policy().batch_size(), 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("SERVER_PORT");
        env::remove_var("RPC_ENDPOINTS");
        env::remove_var("BATCH_SIZE");

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.rpc_endpoints.len(), 3);
        assert_eq!(config.batch_size, 50);
    }
}

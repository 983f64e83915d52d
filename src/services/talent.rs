//! Talent Protocol client
//!
//! Profile and builder score lookups by wallet address. A 404 means the
//! wallet has no data; it is cached like any other answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::{MetricsRecorder, ReadThroughCache};
use crate::error::{GatewayError, Result};
use crate::resilience::{BatchOrchestrator, RetryPolicy};
use crate::services::ens::normalize_address;
use crate::services::http::UpstreamHttp;

/// Profile fields keep the upstream snake_case names on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalentProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// Enrichment for one wallet; either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentData {
    pub score: Option<f64>,
    pub profile: Option<TalentProfile>,
}

impl TalentData {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.profile.is_none()
    }
}

pub struct TalentClient {
    http: UpstreamHttp,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    ttl: Duration,
    profiles: ReadThroughCache<Option<TalentProfile>>,
    scores: ReadThroughCache<Option<f64>>,
    metrics: Arc<MetricsRecorder>,
    batch: BatchOrchestrator,
}

impl TalentClient {
    /// Creates a client; profile and score caches report into one recorder.
    ///
    /// # Arguments
    /// * `base_url` - API root, without trailing slash
    /// * `api_key` - Sent as `X-API-KEY` when present
    /// * `ttl` - Cache lifetime of every answer
    pub fn new(
        http: UpstreamHttp,
        base_url: impl Into<String>,
        api_key: Option<String>,
        retry: RetryPolicy,
        ttl: Duration,
        batch: BatchOrchestrator,
    ) -> Self {
        let metrics = Arc::new(MetricsRecorder::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            retry,
            ttl,
            profiles: ReadThroughCache::with_metrics(metrics.clone()),
            scores: ReadThroughCache::with_metrics(metrics.clone()),
            metrics,
            batch,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn profile_cache(&self) -> &ReadThroughCache<Option<TalentProfile>> {
        &self.profiles
    }

    pub fn score_cache(&self) -> &ReadThroughCache<Option<f64>> {
        &self.scores
    }

    async fn fetch(&self, resource: &str, address: &str) -> Result<Option<Value>> {
        let url = format!("{}/{resource}?source=wallet&id={address}", self.base_url);
        let headers: Vec<(&str, &str)> = self
            .api_key
            .as_deref()
            .map(|key| ("X-API-KEY", key))
            .into_iter()
            .collect();

        self.retry
            .retry_if(
                || self.http.get_json(&url, &headers),
                GatewayError::is_retryable,
            )
            .await
    }

    // == Profile ==
    /// Profile of `address`, `None` when Talent has none.
    pub async fn profile(&self, address: &str) -> Result<Option<TalentProfile>> {
        let key = validated(address)?;
        let cached = self
            .profiles
            .get_or_fetch(&key, self.ttl, || self.fetch_profile(&key))
            .await?;
        Ok(cached.value)
    }

    async fn fetch_profile(&self, address: &str) -> Result<Option<TalentProfile>> {
        let Some(body) = self.fetch("profile", address).await? else {
            return Ok(None);
        };
        match body.get("profile") {
            None | Some(Value::Null) => Ok(None),
            Some(profile) => serde_json::from_value(profile.clone())
                .map(Some)
                .map_err(|e| GatewayError::MalformedResponse(format!("talent profile: {e}"))),
        }
    }

    // == Score ==
    /// Builder score points of `address`, `None` when Talent has none.
    pub async fn score(&self, address: &str) -> Result<Option<f64>> {
        let key = validated(address)?;
        let cached = self
            .scores
            .get_or_fetch(&key, self.ttl, || self.fetch_score(&key))
            .await?;
        Ok(cached.value)
    }

    async fn fetch_score(&self, address: &str) -> Result<Option<f64>> {
        let Some(body) = self.fetch("score", address).await? else {
            return Ok(None);
        };
        match body.get("score") {
            None | Some(Value::Null) => Ok(None),
            Some(score) => score
                .get("points")
                .and_then(Value::as_f64)
                .map(Some)
                .ok_or_else(|| GatewayError::MalformedResponse("talent score without points".into())),
        }
    }

    // == Batch ==
    /// Score and profile for many wallets. Failures degrade to missing parts;
    /// wallets with neither are left out.
    pub async fn batch<I, S>(&self, addresses: I, cancel: &CancellationToken) -> HashMap<String, TalentData>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = addresses
            .into_iter()
            .filter_map(|a| normalize_address(a.as_ref()))
            .collect();

        self.batch
            .resolve_all(
                keys,
                |address| async move {
                    let (score, profile) = tokio::join!(self.score(&address), self.profile(&address));
                    let data = TalentData {
                        score: score.ok().flatten(),
                        profile: profile.ok().flatten(),
                    };
                    Ok::<_, GatewayError>((!data.is_empty()).then_some(data))
                },
                cancel,
            )
            .await
    }
}

fn validated(address: &str) -> Result<String> {
    normalize_address(address)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("invalid address: {address}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BatchPolicy;
    use mockito::Matcher;
    use serde_json::json;

    const WALLET: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

    fn client(url: String, api_key: Option<&str>) -> TalentClient {
        TalentClient::new(
            UpstreamHttp::new(Duration::from_secs(2)).unwrap(),
            url,
            api_key.map(str::to_string),
            RetryPolicy::fixed(2, Duration::ZERO),
            Duration::from_secs(86_400),
            BatchOrchestrator::new(BatchPolicy::new(10, Duration::ZERO)),
        )
    }

    fn wallet_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("source".into(), "wallet".into()),
            Matcher::UrlEncoded("id".into(), WALLET.into()),
        ])
    }

    #[tokio::test]
    async fn test_profile_sends_api_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/profile")
            .match_query(wallet_query())
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(
                json!({"profile": {"name": "vitalik", "display_name": "Vitalik", "image_url": "https://img"}})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let talent = client(server.url(), Some("secret"));
        let profile = talent.profile(WALLET).await.unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Vitalik"));
        assert_eq!(profile.image_url.as_deref(), Some("https://img"));

        talent.profile(WALLET).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_profile_serializes_upstream_field_names() {
        let profile: TalentProfile =
            serde_json::from_value(json!({"name": "v", "displayName": "V", "imageUrl": "https://img"}))
                .unwrap();
        let json = serde_json::to_value(&profile).unwrap();

        assert_eq!(json["display_name"], "V");
        assert_eq!(json["image_url"], "https://img");
        assert!(json.get("displayName").is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_cached_as_none() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/score")
            .match_query(wallet_query())
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let talent = client(server.url(), None);
        assert_eq!(talent.score(WALLET).await.unwrap(), None);
        assert_eq!(talent.score(WALLET).await.unwrap(), None);

        mock.assert_async().await;
        let metrics = talent.metrics().raw();
        assert_eq!((metrics.misses, metrics.hits, metrics.errors), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_score_points() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/score")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"score":{"points":87}}"#)
            .create_async()
            .await;

        let talent = client(format!("{}/", server.url()), None);
        assert_eq!(talent.score(WALLET).await.unwrap(), Some(87.0));
    }

    #[tokio::test]
    async fn test_score_without_points_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/score")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"score":{}}"#)
            .create_async()
            .await;

        let talent = client(server.url(), None);
        assert!(matches!(
            talent.score(WALLET).await,
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let talent = client("http://127.0.0.1:1".to_string(), None);
        assert!(matches!(
            talent.profile("0x12").await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_degrades_per_wallet() {
        let mut server = mockito::Server::new_async().await;
        let _score = server
            .mock("GET", "/score")
            .match_query(wallet_query())
            .with_status(200)
            .with_body(r#"{"score":{"points":42}}"#)
            .create_async()
            .await;
        let _profile = server
            .mock("GET", "/profile")
            .match_query(wallet_query())
            .with_status(500)
            .create_async()
            .await;
        let _other = server
            .mock("GET", Matcher::Regex("^/(score|profile)$".into()))
            .match_query(Matcher::UrlEncoded(
                "id".into(),
                "0x2222222222222222222222222222222222222222".into(),
            ))
            .with_status(404)
            .create_async()
            .await;

        let talent = client(server.url(), None);
        let data = talent
            .batch(
                [WALLET, "0x2222222222222222222222222222222222222222"],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(data.len(), 1);
        let entry = &data[WALLET];
        assert_eq!(entry.score, Some(42.0));
        assert_eq!(entry.profile, None);
        assert_eq!(talent.metrics().raw().errors, 1);
    }
}

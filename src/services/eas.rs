//! EAS GraphQL client
//!
//! Queries Ethereum Attestation Service attestations on Base and decodes the
//! two registry schemas: verification partners and verified builders.
//! Registry queries go through a stale-while-revalidate cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Bytes, B256};
use alloy_sol_types::{sol, SolType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::{normalize_key, Cached, MetricsRecorder, ReadThroughCache};
use crate::error::{GatewayError, Result};
use crate::resilience::RetryPolicy;
use crate::services::http::UpstreamHttp;

/// Schema of `(string name, string url)` partner attestations.
pub const PARTNER_SCHEMA_UID: &str =
    "0x0c25f92df9ba914668f7780e428a1b5238ae7441c765fbe8b7b528f8209ef4e3";

/// Schema of `(bool isBuilder, string context)` builder attestations.
pub const BUILDER_SCHEMA_UID: &str =
    "0x597905068aedcde4321ceaf2c42e24d3bbe0af694159bececd686bf057ec7ea5";

sol! {
    struct PartnerPayload {
        string name;
        string url;
    }

    struct BuilderPayload {
        bool isBuilder;
        string context;
    }
}

/// Non-revoked attestations of one schema.
pub fn schema_query(schema_uid: &str) -> String {
    format!(
        r#"query GetAttestations {{
  attestations(
    where: {{ schemaId: {{ equals: "{schema_uid}" }}, revoked: {{ equals: false }} }}
  ) {{
    id
    attester
    recipient
    refUID
    revocationTime
    expirationTime
    time
    txid
    data
  }}
}}"#
    )
}

// == Attestation ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub id: String,
    pub attester: String,
    pub recipient: String,
    #[serde(rename = "refUID", default)]
    pub ref_uid: Option<String>,
    #[serde(default)]
    pub revocation_time: i64,
    #[serde(default)]
    pub expiration_time: i64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub txid: String,
    /// ABI-encoded schema payload
    #[serde(default)]
    pub data: String,
}

impl Attestation {
    /// The referenced attestation, if any. The zero UID means none.
    pub fn reference(&self) -> Option<&str> {
        self.ref_uid
            .as_deref()
            .filter(|uid| !uid.is_empty() && uid.parse::<B256>().ok() != Some(B256::ZERO))
    }

    /// Raw schema payload; `None` when empty or not hex.
    fn payload(&self) -> Option<Bytes> {
        let bytes: Bytes = self.data.parse().ok()?;
        (!bytes.is_empty()).then_some(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPartner {
    #[serde(flatten)]
    pub attestation: Attestation,
    pub name: String,
    pub url: String,
}

impl VerificationPartner {
    /// Decodes `(string name, string url)`; `None` for empty or invalid data.
    pub fn decode(attestation: Attestation) -> Option<Self> {
        let bytes = attestation.payload()?;
        let PartnerPayload { name, url } = PartnerPayload::abi_decode_params(&bytes, true).ok()?;
        Some(Self {
            attestation,
            name,
            url,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedBuilder {
    #[serde(flatten)]
    pub attestation: Attestation,
    pub context: String,
    /// Name of the partner referenced through `refUID`
    pub partner_name: Option<String>,
}

impl VerifiedBuilder {
    /// Decodes `(bool isBuilder, string context)`.
    ///
    /// Returns `None` for empty or invalid data and for `isBuilder == false`.
    pub fn decode(attestation: Attestation, partners: &HashMap<String, String>) -> Option<Self> {
        let bytes = attestation.payload()?;
        let payload = BuilderPayload::abi_decode_params(&bytes, true).ok()?;
        if !payload.isBuilder {
            return None;
        }
        let context = payload.context;
        let partner_name = attestation
            .reference()
            .and_then(|uid| partners.get(uid).cloned());
        Some(Self {
            attestation,
            context,
            partner_name,
        })
    }
}

// == EAS Client ==
/// Uncached GraphQL access with retry.
pub struct EasClient {
    http: UpstreamHttp,
    url: String,
    retry: RetryPolicy,
}

impl EasClient {
    pub fn new(http: UpstreamHttp, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            url: url.into(),
            retry,
        }
    }

    /// Forwards an arbitrary GraphQL body and returns the raw answer.
    pub async fn execute(&self, body: &Value) -> Result<Value> {
        self.retry
            .retry_if(
                || self.http.post_json(&self.url, body),
                GatewayError::is_retryable,
            )
            .await
    }

    // == Query ==
    /// Runs `query` and checks the answer carries a `data` object.
    ///
    /// GraphQL-level `errors` without data are reported as upstream errors.
    pub async fn query(&self, query: &str) -> Result<Value> {
        let body = json!({ "query": query });
        let response = self.execute(&body).await?;

        if response.get("data").is_some_and(Value::is_object) {
            return Ok(response);
        }
        if let Some(errors) = response.get("errors") {
            warn!(endpoint = %self.url, errors = %errors, "graphql errors");
            return Err(GatewayError::Upstream(format!(
                "{}: graphql errors: {}",
                self.url, errors
            )));
        }
        warn!(endpoint = %self.url, "graphql response without data");
        Err(GatewayError::MalformedResponse(format!(
            "{}: missing data field",
            self.url
        )))
    }
}

/// Extracts `data.attestations` from a GraphQL answer.
pub fn parse_attestations(response: &Value) -> Result<Vec<Attestation>> {
    let list = response
        .pointer("/data/attestations")
        .filter(|v| v.is_array())
        .ok_or_else(|| GatewayError::MalformedResponse("missing data.attestations".into()))?;
    serde_json::from_value(list.clone())
        .map_err(|e| GatewayError::MalformedResponse(format!("attestation shape: {e}")))
}

// == EAS Service ==
/// Cached registry access.
pub struct EasService {
    client: Arc<EasClient>,
    cache: ReadThroughCache<Value>,
    ttl: Duration,
    stale_window: Duration,
}

impl EasService {
    pub fn new(client: EasClient, ttl: Duration, stale_window: Duration) -> Self {
        Self {
            client: Arc::new(client),
            cache: ReadThroughCache::new(),
            ttl,
            stale_window,
        }
    }

    pub fn client(&self) -> &EasClient {
        &self.client
    }

    pub fn cache(&self) -> &ReadThroughCache<Value> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        self.cache.metrics()
    }

    // == Cached Query ==
    /// Cached-or-fresh answer for `query`, keyed by its normalized text.
    pub async fn cached_query(&self, query: &str) -> Result<Cached<Value>> {
        let key = normalize_key(query);
        if key.is_empty() {
            return Err(GatewayError::InvalidRequest("Missing query parameter".into()));
        }

        let client = self.client.clone();
        let query = query.to_string();
        self.cache
            .get_or_fetch_swr(&key, self.ttl, self.stale_window, move || async move {
                client.query(&query).await
            })
            .await
    }

    // == Partners ==
    /// Every partner attestation whose payload decodes.
    pub async fn partners(&self) -> Result<Vec<VerificationPartner>> {
        let response = self.cached_query(&schema_query(PARTNER_SCHEMA_UID)).await?;
        let attestations = parse_attestations(&response.value)?;
        let total = attestations.len();

        let partners: Vec<_> = attestations
            .into_iter()
            .filter_map(VerificationPartner::decode)
            .collect();
        debug!(total, decoded = partners.len(), "partner attestations loaded");
        Ok(partners)
    }

    // == Builders ==
    /// Every builder attestation with `isBuilder == true`, tagged with its
    /// partner's name.
    pub async fn builders(&self) -> Result<Vec<VerifiedBuilder>> {
        let partners = self.partners().await?;
        self.builders_with(&partners).await
    }

    /// Same as [`EasService::builders`] with an already loaded partner list.
    pub async fn builders_with(&self, partners: &[VerificationPartner]) -> Result<Vec<VerifiedBuilder>> {
        let names: HashMap<String, String> = partners
            .iter()
            .map(|p| (p.attestation.id.clone(), p.name.clone()))
            .collect();

        let response = self.cached_query(&schema_query(BUILDER_SCHEMA_UID)).await?;
        let attestations = parse_attestations(&response.value)?;
        let total = attestations.len();

        let builders: Vec<_> = attestations
            .into_iter()
            .filter_map(|a| VerifiedBuilder::decode(a, &names))
            .collect();
        debug!(total, decoded = builders.len(), "builder attestations loaded");
        Ok(builders)
    }
}

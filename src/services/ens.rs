//! ENS reverse resolution
//!
//! Resolves an address to its primary ENS name over plain `eth_call`
//! JSON-RPC. A reverse record only counts when the name forward-resolves to
//! the same address. Endpoints are wrapped in a [`FallbackClient`] and names
//! are cached for a day, including the absence of a name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, hex, keccak256, Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{MetricsRecorder, ReadThroughCache};
use crate::error::{GatewayError, Result};
use crate::resilience::{BatchOrchestrator, FallbackClient, LookupEndpoint};
use crate::services::http::UpstreamHttp;

/// ENS registry, same address on every network.
pub const ENS_REGISTRY: Address = address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

sol! {
    interface IEnsRegistry {
        function resolver(bytes32 node) external view returns (address);
    }

    interface IPublicResolver {
        function name(bytes32 node) external view returns (string);
        function addr(bytes32 node) external view returns (address);
    }
}

// == Name Hashing ==
/// EIP-137 namehash of a dot-separated name.
pub fn namehash(name: &str) -> B256 {
    if name.is_empty() {
        return B256::ZERO;
    }
    name.to_lowercase()
        .rsplit('.')
        .fold(B256::ZERO, |node, label| {
            keccak256([node.as_slice(), keccak256(label.as_bytes()).as_slice()].concat())
        })
}

/// Node of `<address>.addr.reverse`.
pub fn reverse_node(address: &Address) -> B256 {
    namehash(&format!("{}.addr.reverse", hex::encode(address)))
}

/// Lowercase `0x` form of a 20-byte hex address, `None` if it is not one.
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let bare = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))?;
    if bare.len() != 40 {
        return None;
    }
    let parsed: Address = bare.parse().ok()?;
    Some(hex::encode_prefixed(parsed))
}

// == JSON-RPC Endpoint ==
/// One Ethereum JSON-RPC node able to answer ENS lookups.
pub struct JsonRpcEndpoint {
    url: String,
    http: UpstreamHttp,
}

impl JsonRpcEndpoint {
    pub fn new(url: impl Into<String>, http: UpstreamHttp) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }

    /// Runs `call` against `to` and decodes its return value.
    ///
    /// A reverted call or empty return data yields `None`; any other RPC
    /// error is transient so the fallback client moves on.
    async fn eth_call<C: SolCall>(&self, to: Address, call: C) -> Result<Option<C::Return>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": to.to_checksum(None), "data": hex::encode_prefixed(call.abi_encode()) },
                "latest"
            ],
        });
        let response = self.http.post_json(&self.url, &body).await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            if is_revert(error) {
                return Ok(None);
            }
            return Err(GatewayError::Transient(format!(
                "{}: rpc error {}",
                self.url,
                error.get("code").unwrap_or(&Value::Null)
            )));
        }

        let data: Bytes = response
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MalformedResponse(format!("{}: missing result", self.url)))?
            .parse()
            .map_err(|e| GatewayError::MalformedResponse(format!("{}: result: {e}", self.url)))?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(C::abi_decode_returns(&data, true)?))
    }

    /// Resolver contract registered for `node`, `None` when unset.
    async fn resolver(&self, node: B256) -> Result<Option<Address>> {
        let resolver = self
            .eth_call(ENS_REGISTRY, IEnsRegistry::resolverCall { node })
            .await?
            .map(|ret| ret._0);
        Ok(resolver.filter(|r| *r != Address::ZERO))
    }

    async fn reverse_name(&self, address: &Address) -> Result<Option<String>> {
        let node = reverse_node(address);
        let Some(resolver) = self.resolver(node).await? else {
            return Ok(None);
        };
        let name = self
            .eth_call(resolver, IPublicResolver::nameCall { node })
            .await?
            .map(|ret| ret._0);
        Ok(name.filter(|n| !n.is_empty()))
    }

    async fn forward_address(&self, name: &str) -> Result<Option<Address>> {
        let node = namehash(name);
        let Some(resolver) = self.resolver(node).await? else {
            return Ok(None);
        };
        let address = self
            .eth_call(resolver, IPublicResolver::addrCall { node })
            .await?
            .map(|ret| ret._0);
        Ok(address.filter(|a| *a != Address::ZERO))
    }
}

fn is_revert(error: &Value) -> bool {
    error.get("code").and_then(Value::as_i64) == Some(3)
        || error
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains("revert"))
}

#[async_trait]
impl LookupEndpoint for JsonRpcEndpoint {
    type Output = String;

    fn name(&self) -> &str {
        &self.url
    }

    async fn lookup(&self, address: &str) -> Result<Option<String>> {
        let target: Address = address
            .parse()
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid address: {address}")))?;
        let Some(name) = self.reverse_name(&target).await? else {
            return Ok(None);
        };

        match self.forward_address(&name).await? {
            Some(forward) if forward == target => Ok(Some(name)),
            forward => {
                debug!(address, name = %name, ?forward, "reverse record not verified");
                Ok(None)
            }
        }
    }
}

// == ENS Resolver ==
/// Cached, fallback-backed reverse resolver.
pub struct EnsResolver {
    cache: ReadThroughCache<Option<String>>,
    fallback: Arc<FallbackClient<String>>,
    batch: BatchOrchestrator,
    ttl: Duration,
}

impl EnsResolver {
    pub fn new(
        endpoints: Vec<Arc<dyn LookupEndpoint<Output = String>>>,
        batch: BatchOrchestrator,
        ttl: Duration,
    ) -> Result<Self> {
        Ok(Self {
            cache: ReadThroughCache::new(),
            fallback: Arc::new(FallbackClient::new(endpoints)?),
            batch,
            ttl,
        })
    }

    /// Builds one [`JsonRpcEndpoint`] per URL, in order.
    pub fn from_urls(
        urls: &[String],
        http: &UpstreamHttp,
        batch: BatchOrchestrator,
        ttl: Duration,
    ) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|url| {
                Arc::new(JsonRpcEndpoint::new(url.clone(), http.clone()))
                    as Arc<dyn LookupEndpoint<Output = String>>
            })
            .collect();
        Self::new(endpoints, batch, ttl)
    }

    pub fn cache(&self) -> &ReadThroughCache<Option<String>> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        self.cache.metrics()
    }

    pub fn fallback(&self) -> &FallbackClient<String> {
        &self.fallback
    }

    // == Resolve ==
    /// Verified primary name of `address`.
    ///
    /// `None` for invalid addresses, addresses without a name, and when every
    /// endpoint failed. Only the last case is not cached.
    pub async fn resolve(&self, address: &str) -> Option<String> {
        let key = normalize_address(address)?;
        let fallback = self.fallback.clone();
        let lookup_key = key.clone();

        self.cache
            .get_or_fetch(&key, self.ttl, || async move {
                fallback.try_lookup(&lookup_key).await
            })
            .await
            .ok()
            .and_then(|cached| cached.value)
    }

    // == Resolve All ==
    /// Resolves many addresses through the batch orchestrator.
    ///
    /// The map is keyed by lowercase address and only holds resolved names.
    pub async fn resolve_all<I, S>(&self, addresses: I, cancel: &CancellationToken) -> HashMap<String, String>
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
                |address| async move { Ok::<_, GatewayError>(self.resolve(&address).await) },
                cancel,
            )
            .await
    }
}

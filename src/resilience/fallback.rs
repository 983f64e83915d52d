//! Multi-Endpoint Fallback Client
//!
//! Wraps an ordered list of equivalent endpoints behind one lookup. A failing
//! endpoint moves a shared cursor to the next one, and the cursor stays there
//! for later calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

// == Lookup Endpoint ==
/// One upstream able to answer a keyed lookup.
///
/// `Ok(None)` means the endpoint answered and has no value for the key; only
/// `Err` makes the client rotate.
#[async_trait]
pub trait LookupEndpoint: Send + Sync {
    type Output: Send;

    /// Identifier used in logs (usually the URL).
    fn name(&self) -> &str;

    async fn lookup(&self, key: &str) -> Result<Option<Self::Output>>;
}

// == Fallback Client ==
/// Round-robin failover across endpoints with a sticky cursor.
pub struct FallbackClient<V> {
    endpoints: Vec<Arc<dyn LookupEndpoint<Output = V>>>,
    cursor: AtomicUsize,
}

impl<V: Send> FallbackClient<V> {
    /// Creates a client over `endpoints`, starting at index 0.
    ///
    /// Returns an error when no endpoint is given.
    pub fn new(endpoints: Vec<Arc<dyn LookupEndpoint<Output = V>>>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(GatewayError::Internal(
                "fallback client needs at least one endpoint".to_string(),
            ));
        }
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Index of the endpoint the next call starts with.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire) % self.endpoints.len()
    }

    // == Try Lookup ==
    /// Tries every endpoint at most once, starting from the cursor.
    ///
    /// Returns the last endpoint error when all of them fail.
    pub async fn try_lookup(&self, key: &str) -> Result<Option<V>> {
        let count = self.endpoints.len();
        let start = self.cursor();
        let mut last_error = None;

        for attempt in 0..count {
            let index = (start + attempt) % count;
            let endpoint = &self.endpoints[index];

            match endpoint.lookup(key).await {
                Ok(value) => {
                    debug!(endpoint = endpoint.name(), key, "lookup answered");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        endpoint = endpoint.name(),
                        key,
                        attempt = attempt + 1,
                        max_attempts = count,
                        error = %err,
                        "endpoint lookup failed"
                    );
                    last_error = Some(err);

                    if attempt + 1 < count {
                        self.advance_from(index);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::Internal("fallback client has no endpoints".to_string())
        }))
    }

    // == Lookup ==
    /// Soft-failing lookup: `None` when the key has no value or every
    /// endpoint failed. Never returns an error.
    pub async fn lookup(&self, key: &str) -> Option<V> {
        match self.try_lookup(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "all endpoints failed");
                None
            }
        }
    }

    /// Moves the cursor past `failed`, unless another caller already moved it.
    fn advance_from(&self, failed: usize) {
        let count = self.endpoints.len();
        let next = (failed + 1) % count;
        let current = self.cursor.load(Ordering::Acquire);
        if current % count == failed
            && self
                .cursor
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            debug!(endpoint = self.endpoints[next].name(), "switched endpoint");
        }
    }
}

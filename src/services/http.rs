//! Upstream HTTP plumbing
//!
//! Thin wrapper around `reqwest` shared by every upstream client. It applies
//! the hard request timeout and maps transport failures and status codes onto
//! [`GatewayError`] so callers can decide what to retry.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::{GatewayError, Result};

/// HTTP client with a hard per-request timeout.
#[derive(Debug, Clone)]
pub struct UpstreamHttp {
    client: Client,
    timeout: Duration,
}

impl UpstreamHttp {
    /// Builds the shared client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the underlying client fails to build.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("builder-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                GatewayError::Internal(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client, timeout })
    }

    /// POSTs `body` as JSON and decodes the JSON answer.
    pub async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value> {
        let request = self.client.post(url).json(body);
        match self.send(url, request).await? {
            Some(value) => Ok(value),
            None => Err(GatewayError::Upstream(format!("{url} returned 404"))),
        }
    }

    /// GETs `url`; a 404 is reported as `Ok(None)`.
    pub async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(url, request).await
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Option<Value>> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| GatewayError::Timeout(format!("{url} after {:?}", self.timeout)))?
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        trace!(url, status = status.as_u16(), "upstream responded");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(url, status)?;

        let value = response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(format!("{url} while reading body"))
            } else {
                GatewayError::MalformedResponse(format!("{url}: body is not JSON"))
            }
        })?;
        Ok(Some(value))
    }
}

/// Maps a non-success status onto the error taxonomy.
///
/// 429 and 5xx are transient; every other non-success status is not.
pub fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(GatewayError::Transient(format!(
            "{url}: HTTP error! status: {}",
            status.as_u16()
        )))
    } else {
        Err(GatewayError::Upstream(format!(
            "{url}: HTTP error! status: {}",
            status.as_u16()
        )))
    }
}

/// Sanitized description of a transport failure; no upstream body is echoed.
fn classify_transport_error(url: &str, error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(url.to_string())
    } else if error.is_connect() {
        GatewayError::Transient(format!("{url}: connection refused or unreachable"))
    } else if error.is_decode() {
        GatewayError::MalformedResponse(format!("{url}: response decode error"))
    } else {
        GatewayError::Transient(format!("{url}: request failed"))
    }
}

//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming request bodies and query strings.

use serde::Deserialize;

use crate::error::{GatewayError, Result};

/// Request body for POST /api/cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheQueryRequest {
    /// GraphQL query text
    #[serde(default)]
    pub query: Option<String>,
}

impl CacheQueryRequest {
    /// Returns the query, rejecting a missing or blank one.
    pub fn into_query(self) -> Result<String> {
        match self.query {
            Some(query) if !query.trim().is_empty() => Ok(query),
            _ => Err(GatewayError::InvalidRequest("Missing query parameter".into())),
        }
    }
}

/// Request body for POST /api/ens
#[derive(Debug, Clone, Deserialize)]
pub struct EnsRequest {
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Query string of the Talent endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

impl AddressQuery {
    pub fn into_address(self) -> Result<String> {
        match self.address {
            Some(address) if !address.trim().is_empty() => Ok(address),
            _ => Err(GatewayError::InvalidRequest("Address is required".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_query_request_deserialize() {
        let req: CacheQueryRequest = serde_json::from_str(r#"{"query": "{ x }"}"#).unwrap();
        assert_eq!(req.into_query().unwrap(), "{ x }");
    }

    #[test]
    fn test_missing_query_is_invalid() {
        let req: CacheQueryRequest = serde_json::from_str("{}").unwrap();
        assert!(matches!(req.into_query(), Err(GatewayError::InvalidRequest(_))));

        let req: CacheQueryRequest = serde_json::from_str(r#"{"query": "  "}"#).unwrap();
        assert!(req.into_query().is_err());
    }

    #[test]
    fn test_ens_request_defaults_to_empty() {
        let req: EnsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.addresses.is_empty());
    }

    #[test]
    fn test_address_query() {
        assert!(AddressQuery::default().into_address().is_err());
        let query = AddressQuery {
            address: Some("0xabc".into()),
        };
        assert_eq!(query.into_address().unwrap(), "0xabc");
    }
}

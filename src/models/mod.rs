//! Request and Response models for the gateway API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{AddressQuery, CacheQueryRequest, EnsRequest};
pub use responses::{
    CacheQueryResponse, EnsBatchMetrics, EnsResponse, HealthResponse, QueryPerformance,
    TalentProfileResponse, TalentScoreResponse,
};

//! Upstream Services Module
//!
//! Clients for the external collaborators: EAS GraphQL, ENS over JSON-RPC and
//! the Talent Protocol REST API.

pub mod eas;
pub mod ens;
pub mod http;
pub mod talent;

pub use eas::{
    Attestation, EasClient, EasService, VerificationPartner, VerifiedBuilder, BUILDER_SCHEMA_UID,
    PARTNER_SCHEMA_UID,
};
pub use ens::{normalize_address, EnsResolver, JsonRpcEndpoint};
pub use http::UpstreamHttp;
pub use talent::{TalentClient, TalentData, TalentProfile};

//! Builder Registry - resilient gateway for onchain builder data
//!
//! Serves EAS attestations through a stale-while-revalidate cache and
//! enriches builders with ENS names and Talent Protocol data, behind retry,
//! endpoint fallback and batch orchestration.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod resilience;
pub mod services;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use tasks::spawn_cleanup_task;

//! Resilience Module
//!
//! Building blocks every upstream call site composes: retry with backoff,
//! multi-endpoint fallback and rate-limited batch orchestration.

mod batch;
mod fallback;
mod retry;

pub use batch::{BatchOrchestrator, BatchPolicy};
pub use fallback::{FallbackClient, LookupEndpoint};
pub use retry::{Backoff, RetryPolicy};

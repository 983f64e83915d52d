//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

// == Freshness ==
/// Where an entry sits relative to its TTL and stale window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age < ttl`: serve directly
    Fresh,
    /// `ttl <= age < stale_window`: serve, then refresh in the background
    Stale,
    /// Past every window: must be fetched again
    Expired,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Monotonic insertion time, used for every age check
    pub inserted_at: Instant,
    /// Wall-clock insertion time, reported to clients
    pub created_at: DateTime<Utc>,
    /// Age below which the entry is fresh
    pub ttl: Duration,
    /// Total age up to which a stale entry may still be served
    pub stale_window: Option<Duration>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Freshness period
    /// * `stale_window` - Optional longer period during which the value is still servable
    pub fn new(value: V, ttl: Duration, stale_window: Option<Duration>) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            created_at: Utc::now(),
            ttl,
            stale_window,
        }
    }

    /// Time elapsed since insertion.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    // == Freshness ==
    /// Classifies the entry at the current instant.
    pub fn freshness(&self) -> Freshness {
        let age = self.age();
        if age < self.ttl {
            Freshness::Fresh
        } else if self.stale_window.is_some_and(|window| age < window) {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness() == Freshness::Fresh
    }

    /// True once the entry can no longer be served in any form.
    pub fn is_expired(&self) -> bool {
        self.freshness() == Freshness::Expired
    }
}

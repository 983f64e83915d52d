//! Batch Orchestrator
//!
//! Resolves a large key list in fixed-size chunks. Keys inside a chunk run
//! concurrently; chunks run one after another with a pause in between so
//! third-party rate limits are respected.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// == Batch Policy ==
/// Chunk size and inter-chunk delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl BatchPolicy {
    /// Creates a policy. A zero batch size is treated as one.
    pub fn new(batch_size: usize, inter_batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            inter_batch_delay,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn inter_batch_delay(&self) -> Duration {
        self.inter_batch_delay
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::new(50, Duration::from_millis(500))
    }
}

// == Batch Orchestrator ==
/// Joins per-key resolution into one map of results.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOrchestrator {
    policy: BatchPolicy,
}

impl BatchOrchestrator {
    pub fn new(policy: BatchPolicy) -> Self {
        Self { policy }
    }

    // == Resolve All ==
    /// Resolves every unique key with `resolver` and collects the successes.
    ///
    /// Keys resolving to `Ok(None)` or `Err(_)` are left out of the map; one
    /// failing key never stops the batch. When `cancel` fires, no further
    /// chunk is started and the results gathered so far are returned.
    pub async fn resolve_all<K, V, E, F, Fut>(
        &self,
        keys: K,
        resolver: F,
        cancel: &CancellationToken,
    ) -> HashMap<String, V>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Display,
    {
        let unique = dedup(keys);
        let chunk_count = unique.len().div_ceil(self.policy.batch_size);
        let mut results = HashMap::with_capacity(unique.len());

        for (index, chunk) in unique.chunks(self.policy.batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(chunk = index, chunk_count, "batch cancelled before chunk");
                break;
            }

            let pending = chunk.iter().map(|key| {
                let key = key.clone();
                let fut = resolver(key.clone());
                async move { (key, fut.await) }
            });

            for (key, outcome) in join_all(pending).await {
                match outcome {
                    Ok(Some(value)) => {
                        results.insert(key, value);
                    }
                    Ok(None) => debug!(key = %key, "no value for key"),
                    Err(err) => debug!(key = %key, error = %err, "key failed, skipping"),
                }
            }

            debug!(
                chunk = index + 1,
                chunk_count,
                resolved = results.len(),
                "batch chunk settled"
            );

            let is_last = index + 1 == chunk_count;
            if !is_last && !self.policy.inter_batch_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.inter_batch_delay) => {}
                    _ = cancel.cancelled() => {
                        info!(chunk = index + 1, chunk_count, "batch cancelled during delay");
                        break;
                    }
                }
            }
        }

        results
    }
}

/// Unique keys in first-seen order.
fn dedup<K>(keys: K) -> Vec<String>
where
    K: IntoIterator,
    K::Item: Into<String>,
{
    let mut seen = HashSet::new();
    keys.into_iter()
        .map(Into::into)
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        assert_eq!(dedup(keys(&["b", "a", "b", "c", "a"])), keys(&["b", "a", "c"]));
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        assert_eq!(BatchPolicy::new(0, Duration::ZERO).batch_size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_run_sequentially() {
        let orchestrator = BatchOrchestrator::new(BatchPolicy::new(2, Duration::ZERO));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let results = orchestrator
            .resolve_all(
                keys(&["a", "b", "c", "d", "e"]),
                |key| {
                    let in_flight = in_flight.clone();
                    let max_in_flight = max_in_flight.clone();
                    let calls = calls.clone();
                    let order = order.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        order.lock().unwrap().push(key.clone());
                        Ok::<_, String>(Some(key.to_uppercase()))
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 5);
        assert_eq!(results["e"], "E");

        // Chunk [a, b] settles before [c, d] starts, which settles before [e]
        let order = order.lock().unwrap();
        let position = |k: &str| order.iter().position(|x| x == k).unwrap();
        assert!(position("a") < position("c") && position("b") < position("c"));
        assert!(position("c") < position("e") && position("d") < position("e"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_chunks() {
        let orchestrator = BatchOrchestrator::new(BatchPolicy::new(2, Duration::from_millis(500)));
        let start = Instant::now();

        orchestrator
            .resolve_all(
                keys(&["a", "b", "c", "d", "e"]),
                |key| async move { Ok::<_, String>(Some(key)) },
                &CancellationToken::new(),
            )
            .await;

        // Three chunks, two gaps
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_failures_and_empty_results_are_absent() {
        let orchestrator = BatchOrchestrator::new(BatchPolicy::new(3, Duration::ZERO));

        let results = orchestrator
            .resolve_all(
                keys(&["ok", "none", "err", "ok"]),
                |key| async move {
                    match key.as_str() {
                        "ok" => Ok(Some(1u32)),
                        "none" => Ok(None),
                        _ => Err("upstream down".to_string()),
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("ok"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_next_chunk() {
        let orchestrator = BatchOrchestrator::new(BatchPolicy::new(1, Duration::from_secs(1)));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let trigger = cancel.clone();
        let counter = calls.clone();
        let results = orchestrator
            .resolve_all(
                keys(&["a", "b", "c"]),
                move |key| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    trigger.cancel();
                    async move { Ok::<_, String>(Some(key)) }
                },
                &cancel,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("a"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let orchestrator = BatchOrchestrator::default();
        let results = orchestrator
            .resolve_all(
                Vec::<String>::new(),
                |key| async move { Ok::<_, String>(Some(key)) },
                &CancellationToken::new(),
            )
            .await;
        assert!(results.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Output keys are a subset of the unique inputs, and only keys whose
        // resolver produced a value are present
        #[test]
        fn prop_batch_completeness(
            input in prop::collection::vec("[a-f]{1,2}", 0..40),
            batch_size in 1usize..8,
        ) {
            let orchestrator = BatchOrchestrator::new(BatchPolicy::new(batch_size, Duration::ZERO));
            let results = tokio_test::block_on(orchestrator.resolve_all(
                input.clone(),
                |key| async move {
                    if key.len() == 1 {
                        Ok::<_, String>(Some(key))
                    } else {
                        Ok(None)
                    }
                },
                &CancellationToken::new(),
            ));

            let unique: HashSet<String> = input.iter().cloned().collect();
            for (key, value) in &results {
                prop_assert!(unique.contains(key));
                prop_assert_eq!(key, value);
                prop_assert_eq!(key.len(), 1);
            }
            let expected = unique.iter().filter(|k| k.len() == 1).count();
            prop_assert_eq!(results.len(), expected);
        }
    }
}

//! In-flight request collapsing.
//!
//! One `Deduplicator` per logical operation (technicals, ratios, price
//! history). Concurrent callers for the same key share a single fetch and all
//! receive its result, value or error. Nothing is kept after the fetch
//! completes; a later caller starts a new fetch.

use analysis_core::AnalysisError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, AnalysisError>>>;

/// Map of key → (generation, in-flight fetch)
type InFlight<T> = HashMap<String, (u64, SharedFetch<T>)>;

pub struct Deduplicator<T> {
    operation: &'static str,
    in_flight: Arc<Mutex<InFlight<T>>>,
    generation: AtomicU64,
}

fn lock<T>(map: &Mutex<InFlight<T>>) -> MutexGuard<'_, InFlight<T>> {
    // No await happens under this lock, so a poisoned map is still consistent
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Number of keys with a fetch currently running
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Run `fetch` for `key` unless a fetch for the same key is already in
    /// flight, in which case wait for that one instead.
    ///
    /// The fetch runs on its own task, so a caller that gives up (is
    /// cancelled) does not abort it for the other waiters.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<T, AnalysisError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>> + Send + 'static,
    {
        let shared = {
            let mut map = lock(&self.in_flight);
            match map.get(key) {
                Some((_, pending)) => {
                    tracing::debug!("{}: joining in-flight fetch for {}", self.operation, key);
                    pending.clone()
                }
                None => {
                    let id = self.generation.fetch_add(1, Ordering::Relaxed);
                    let pending = self.start(key.to_string(), id, fetch());
                    map.insert(key.to_string(), (id, pending.clone()));
                    pending
                }
            }
        };
        shared.await
    }

    fn start<Fut>(&self, key: String, id: u64, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, AnalysisError>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let operation = self.operation;
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            let mut map = lock(&in_flight);
            if map.get(&key).is_some_and(|(current, _)| *current == id) {
                map.remove(&key);
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(AnalysisError::Unknown(format!("{} fetch task failed: {}", operation, e)))
            })
        }
        .boxed()
        .shared()
    }
}

//! Single-flight registry: one running generation per backend and prompt key

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::error::{AppError, Result};

/// Handle every waiter on one key awaits
pub type Flight = Shared<BoxFuture<'static, Result<Bytes>>>;

/// Whether the caller started the flight or joined one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Maps a backend and prompt key to the generation currently running for it.
///
/// The generation runs in its own task, so it finishes (and fills the cache)
/// even when every waiting request has gone away. The entry is removed by
/// the task itself when it ends, whatever the outcome.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    flights: Arc<DashMap<CacheKey, Flight>>,
}

/// Removes the registry entry when the generation task finishes or is dropped
struct FlightGuard {
    flights: Arc<DashMap<CacheKey, Flight>>,
    key: CacheKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, or spawn `start()` as a new one
    pub fn join_or_start<F, Fut>(&self, key: &CacheKey, start: F) -> (Flight, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), Role::Follower),
            Entry::Vacant(entry) => {
                let guard = FlightGuard {
                    flights: Arc::clone(&self.flights),
                    key: key.clone(),
                };
                let job = start();
                // The guard blocks on this shard until the insert below is done.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    job.await
                });

                let flight = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(AppError::Internal(format!("generation task aborted: {}", e)))
                    })
                }
                .boxed()
                .shared();

                entry.insert(flight.clone());
                (flight, Role::Leader)
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of generations running right now
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

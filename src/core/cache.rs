//! Single-flight, stale-while-revalidate cache for one shared reference payload.
//!
//! The cache keeps two tiers:
//!
//! - an in-memory [`CachedRecord`], authoritative for the life of the process
//! - a durable record (`{"storedAt": <ms>, "payload": ...}`) in a
//!   [`DurableStore`], which survives restarts but is treated as untrusted input
//!
//! At most one fetch is in flight at a time. It is represented by a shared
//! future tagged with a generation number, and every caller that needs fresh
//! data awaits a clone of it. The fetch is also driven by a spawned task, so a
//! background refresh completes even when nobody is waiting on it. The durable
//! record is read only by the first cold load, off the state lock.
//!
//! | state          | `get()` behaviour                                   |
//! |----------------|-----------------------------------------------------|
//! | Empty          | start a cold load: durable record, else network     |
//! | ColdFetching   | join the in-flight fetch                            |
//! | WarmFresh      | return the in-memory copy, no I/O                   |
//! | WarmStale      | return the in-memory copy, start one background refresh |

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{NetworkReason, TransportError};
use crate::infra::store::DurableStore;
use crate::util::clock::Clock;

/// Default freshness window for the reference payload.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(60 * 60);

/// Produces the payload on a cache miss or refresh.
///
/// Implementations are expected to route through the bounded scheduler; the
/// cache only guarantees that at most one `fetch` runs at a time.
#[async_trait]
pub trait ReferenceSource<T>: Send + Sync + 'static {
    /// Fetch a fresh copy of the payload.
    async fn fetch(&self) -> Result<T, TransportError>;
}

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Bound required of cached payloads.
pub trait CachePayload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CachePayload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The in-memory copy. The payload is only ever swapped as a whole.
#[derive(Debug)]
pub struct CachedRecord<T> {
    /// When the payload was fetched (or stored, if hydrated), epoch ms.
    pub fetched_at_ms: u64,
    /// The payload itself.
    pub payload: Arc<T>,
}

impl<T> Clone for CachedRecord<T> {
    fn clone(&self) -> Self {
        Self {
            fetched_at_ms: self.fetched_at_ms,
            payload: Arc::clone(&self.payload),
        }
    }
}

/// Wire shape of the durable record.
#[derive(Serialize, Deserialize)]
struct StoredRecord<P> {
    #[serde(rename = "storedAt")]
    stored_at: u64,
    payload: P,
}

/// Observable cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing in memory and no fetch running.
    Empty,
    /// Nothing in memory, first fetch running.
    ColdFetching,
    /// In-memory copy within the freshness window.
    WarmFresh {
        /// A forced refresh is running.
        refreshing: bool,
    },
    /// In-memory copy past the freshness window.
    WarmStale {
        /// A background refresh is running.
        refreshing: bool,
    },
}

/// Options for [`ReferenceCache::get_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Ignore freshness and fetch, joining any fetch already in flight.
    pub force_refresh: bool,
}

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// How long a copy counts as fresh before revalidation.
    pub freshness: Duration,
    /// Durable store key.
    pub storage_key: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            storage_key: "bungie_manifest".into(),
        }
    }
}

type FetchOutcome<T> = Result<Arc<T>, TransportError>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutcome<T>>>;

struct InflightFetch<T> {
    generation: u64,
    future: SharedFetch<T>,
}

struct CacheState<T> {
    current: Option<CachedRecord<T>>,
    inflight: Option<InflightFetch<T>>,
    next_generation: u64,
    /// The durable record has been consulted. It is read once, by the first
    /// cold load, and never again while memory or a fetch can answer.
    durable_checked: bool,
}

struct CacheInner<T, S> {
    settings: CacheSettings,
    source: Arc<dyn ReferenceSource<T>>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    spawner: S,
    state: Mutex<CacheState<T>>,
}

/// Shared handle to the cache; clones observe the same state.
pub struct ReferenceCache<T, S> {
    inner: Arc<CacheInner<T, S>>,
}

impl<T, S> Clone for ReferenceCache<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> ReferenceCache<T, S>
where
    T: CachePayload,
    S: Spawn + Send + Sync + 'static,
{
    /// Build an empty cache over `source`, persisting to `store`.
    pub fn new(
        settings: CacheSettings,
        source: Arc<dyn ReferenceSource<T>>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        spawner: S,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                settings,
                source,
                store,
                clock,
                spawner,
                state: Mutex::new(CacheState {
                    current: None,
                    inflight: None,
                    next_generation: 0,
                    durable_checked: false,
                }),
            }),
        }
    }

    /// Return the payload, fetching only when no usable copy exists.
    pub async fn get(&self) -> Result<Arc<T>, TransportError> {
        self.get_with(GetOptions::default()).await
    }

    /// Return the payload with explicit options.
    pub async fn get_with(&self, options: GetOptions) -> Result<Arc<T>, TransportError> {
        let (fetch, started) = {
            let mut state = self.inner.state.lock();
            if !options.force_refresh {
                if let Some(record) = state.current.clone() {
                    let refresh = if self.inner.is_stale(&record) {
                        CacheInner::revalidate(&self.inner, &mut state)
                    } else {
                        tracing::trace!("reference cache hit");
                        None
                    };
                    drop(state);
                    if let Some(refresh) = refresh {
                        self.inner.drive(refresh);
                    }
                    return Ok(record.payload);
                }
                if state.inflight.is_none() && !state.durable_checked {
                    (self.start_cold_load(&mut state), true)
                } else {
                    CacheInner::join_or_fetch(&self.inner, &mut state)
                }
            } else {
                CacheInner::join_or_fetch(&self.inner, &mut state)
            }
        };
        if started {
            self.inner.drive(fetch.clone());
        }
        fetch.await
    }

    /// Current state, for diagnostics.
    pub fn status(&self) -> CacheStatus {
        let state = self.inner.state.lock();
        let refreshing = state.inflight.is_some();
        match &state.current {
            None if refreshing => CacheStatus::ColdFetching,
            None => CacheStatus::Empty,
            Some(record) if self.inner.is_stale(record) => CacheStatus::WarmStale { refreshing },
            Some(_) => CacheStatus::WarmFresh { refreshing },
        }
    }

    /// The in-memory record, if any, without touching the store or network.
    pub fn peek(&self) -> Option<CachedRecord<T>> {
        self.inner.state.lock().current.clone()
    }

    /// Claim the in-flight slot for a load that tries the durable record
    /// before the network. Callers arriving meanwhile join it.
    fn start_cold_load(&self, state: &mut CacheState<T>) -> SharedFetch<T> {
        state.durable_checked = true;
        let generation = state.take_generation();
        let inner = Arc::clone(&self.inner);
        let future = async move { CacheInner::run_cold_load(inner, generation).await }
            .boxed()
            .shared();
        state.track(generation, &future);
        tracing::info!(generation, "reference data cold load started");
        future
    }
}

impl<T> CacheState<T> {
    fn take_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn track(&mut self, generation: u64, future: &SharedFetch<T>) {
        self.inflight = Some(InflightFetch {
            generation,
            future: future.clone(),
        });
    }

    /// Clear the in-flight marker if it still belongs to `generation`.
    fn finish(&mut self, generation: u64) {
        if self
            .inflight
            .as_ref()
            .is_some_and(|inflight| inflight.generation == generation)
        {
            self.inflight = None;
        }
    }
}

impl<T, S> CacheInner<T, S>
where
    T: CachePayload,
    S: Spawn + Send + Sync + 'static,
{
    fn is_stale(&self, record: &CachedRecord<T>) -> bool {
        let age_ms = self.clock.now_ms().saturating_sub(record.fetched_at_ms);
        u128::from(age_ms) >= self.settings.freshness.as_millis()
    }

    /// Hand a newly started fetch to the spawner. Never called with the state
    /// lock held, since a spawner may poll the future inline.
    fn drive(&self, fetch: SharedFetch<T>) {
        self.spawner.spawn(async move {
            let _ = fetch.await;
        });
    }

    /// Start a background refresh unless one is already running. Returns the
    /// fetch to drive once the lock is released.
    fn revalidate(inner: &Arc<Self>, state: &mut CacheState<T>) -> Option<SharedFetch<T>> {
        if state.inflight.is_some() {
            return None;
        }
        tracing::debug!("reference data stale; refreshing in background");
        let (future, _) = Self::join_or_fetch(inner, state);
        Some(future)
    }

    /// Join the in-flight fetch, or start a network fetch. The flag is true
    /// when the caller started it and must drive it.
    fn join_or_fetch(inner: &Arc<Self>, state: &mut CacheState<T>) -> (SharedFetch<T>, bool) {
        if let Some(inflight) = &state.inflight {
            tracing::debug!(generation = inflight.generation, "joining in-flight fetch");
            return (inflight.future.clone(), false);
        }

        let generation = state.take_generation();
        let task = Arc::clone(inner);
        let future = async move { Self::run_fetch(task, generation).await }
            .boxed()
            .shared();
        state.track(generation, &future);
        tracing::info!(generation, "reference data fetch started");
        (future, true)
    }

    /// First load after start-up: a valid durable record answers it, anything
    /// else falls through to the network under the same generation.
    async fn run_cold_load(inner: Arc<Self>, generation: u64) -> FetchOutcome<T> {
        let Some(stored) = inner.read_durable().await else {
            return Self::run_fetch(inner, generation).await;
        };

        let (record, refresh) = {
            let mut state = inner.state.lock();
            let record = if let Some(current) = state.current.clone() {
                current
            } else {
                tracing::info!(
                    generation,
                    stored_at = stored.fetched_at_ms,
                    "reference data hydrated from durable store"
                );
                state.current = Some(stored.clone());
                stored
            };
            state.finish(generation);
            let refresh = if inner.is_stale(&record) {
                Self::revalidate(&inner, &mut state)
            } else {
                None
            };
            (record, refresh)
        };
        if let Some(refresh) = refresh {
            inner.drive(refresh);
        }
        Ok(record.payload)
    }

    async fn run_fetch(inner: Arc<Self>, generation: u64) -> FetchOutcome<T> {
        let result = match AssertUnwindSafe(inner.source.fetch()).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(generation, "reference source panicked");
                Err(TransportError::Network {
                    reason: NetworkReason::Other,
                    message: "reference source panicked".into(),
                })
            }
        };
        let now = inner.clock.now_ms();
        let outcome = match result {
            Ok(payload) => {
                let payload = Arc::new(payload);
                inner.persist(now, &payload).await;
                Ok(payload)
            }
            Err(err) => {
                tracing::warn!(generation, error = %err, "reference data fetch failed");
                Err(err)
            }
        };

        let mut state = inner.state.lock();
        if let Ok(payload) = &outcome {
            state.current = Some(CachedRecord {
                fetched_at_ms: now,
                payload: Arc::clone(payload),
            });
            tracing::info!(generation, "reference data refreshed");
        }
        state.finish(generation);
        outcome
    }

    /// Load the durable record. Any read or parse problem is logged and
    /// treated as a miss.
    async fn read_durable(&self) -> Option<CachedRecord<T>> {
        let key = self.settings.storage_key.as_str();
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, error = %err, "durable store read failed; treating as absent");
                return None;
            }
        };
        let record: StoredRecord<T> = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(key, error = %err, "durable record is invalid; treating as absent");
                return None;
            }
        };
        if record.stored_at == 0 {
            tracing::warn!(key, "durable record has no timestamp; treating as absent");
            return None;
        }
        Some(CachedRecord {
            fetched_at_ms: record.stored_at,
            payload: Arc::new(record.payload),
        })
    }

    /// Best-effort write of the durable record.
    async fn persist(&self, now: u64, payload: &T) {
        let key = self.settings.storage_key.as_str();
        let record = StoredRecord {
            stored_at: now,
            payload,
        };
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key, error = %err, "reference data not serializable; skipping persistence");
                return;
            }
        };
        if let Err(err) = self.store.set(key, &encoded).await {
            tracing::warn!(key, error = %err, "durable store write failed; continuing without persistence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_record_uses_camel_case_timestamp() {
        let encoded = serde_json::to_string(&StoredRecord {
            stored_at: 42,
            payload: &vec![1, 2],
        })
        .unwrap();
        assert_eq!(encoded, r#"{"storedAt":42,"payload":[1,2]}"#);
    }

    #[test]
    fn stored_record_rejects_missing_fields() {
        assert!(serde_json::from_str::<StoredRecord<Vec<u8>>>(r#"{"payload":[1]}"#).is_err());
        assert!(serde_json::from_str::<StoredRecord<Vec<u8>>>(r#"{"storedAt":"x","payload":[1]}"#).is_err());
    }
}

//! Core request governance: scheduling, transport, retry and caching.

pub mod cache;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod transport;

pub use cache::{
    CachePayload, CacheSettings, CacheStatus, CachedRecord, GetOptions, ReferenceCache,
    ReferenceSource, Spawn, DEFAULT_FRESHNESS,
};
pub use error::{AppResult, ClientError, NetworkReason, StoreError, TransportError};
pub use retry::{RetryPolicy, DEFAULT_BACKOFF_STEP};
pub use scheduler::{BoundedScheduler, SchedulerStats};
pub use transport::{ApiKeyPolicy, HttpTransport, RequestDescriptor};

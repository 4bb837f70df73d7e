//! Configuration models for upstream clients, concurrency and caching.

pub mod client;

pub use client::{CacheConfig, ClientConfig, PlatformConfig, ReportingConfig, StoreBackendConfig};

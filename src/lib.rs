//! # Caldera Client
//!
//! Outbound request governance for the Caldera activity dashboard.
//!
//! Every view of the dashboard talks to two upstreams: the rate-limited game
//! platform API and the internal reporting API. This crate sits between the
//! views and those upstreams and provides three layers:
//!
//! - **Bounded Scheduler**: admits at most N concurrent platform calls, queues
//!   the rest in strict FIFO order, and never leaks a slot, whether a call
//!   succeeds, fails, panics or is abandoned.
//! - **Resilient Transport**: one HTTP call with structured failures
//!   (`HttpStatus`, `Network`, `Decode`), linear-backoff retry on server
//!   errors, caller cancellation and an API key attached only to allow-listed
//!   paths.
//! - **Reference-Data Cache**: single-flight, stale-while-revalidate cache for
//!   the platform manifest, persisted to a durable store that survives
//!   restarts and is treated as untrusted on read.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use caldera_client::builders::build_clients;
//! use caldera_client::config::ClientConfig;
//! use caldera_client::runtime::TokioSpawner;
//!
//! caldera_client::util::init_tracing();
//! let cfg = ClientConfig::from_env()?;
//! let clients = build_clients(&cfg, TokioSpawner::current()?)?;
//!
//! // Concurrent callers share one manifest fetch.
//! let manifest = clients.manifest.get().await?;
//! let activities = clients.platform.activity_definitions(&clients.manifest).await?;
//! let board = clients.reporting.speed_leaderboard("vault-of-glass").await?;
//! ```
//!
//! ## Lower-level use
//!
//! The pieces compose without the builder:
//!
//! ```rust,ignore
//! use caldera_client::core::{BoundedScheduler, HttpTransport, RequestDescriptor};
//!
//! let scheduler = BoundedScheduler::new(4)?;
//! let transport = HttpTransport::new(reqwest::Client::new());
//! let req = RequestDescriptor::get(url).with_retry_budget(2);
//! let body: serde_json::Value = scheduler.schedule(|| transport.call(&req)).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduler, transport, retry policy, cache and error types.
pub mod core;
/// Configuration models for upstreams, concurrency and caching.
pub mod config;
/// Builders to construct the client set from configuration.
pub mod builders;
/// Durable storage backends.
pub mod infra;
/// Upstream API clients, wire models and the tokio spawner.
pub mod runtime;
/// Shared utilities.
pub mod util;

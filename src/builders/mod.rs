//! Builders wiring clients, scheduler and cache together from configuration.

pub mod client_builder;

pub use client_builder::{build_clients, CalderaClients};

//! Infrastructure adapters for durable storage.

pub mod store;

pub use store::{DurableStore, FileStore, InMemoryStore};

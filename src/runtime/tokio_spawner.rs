//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::{ClientError, Spawn};

/// Tokio-based spawner that runs background refreshes on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a `TokioSpawner` from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is currently running on.
    pub fn current() -> Result<Self, ClientError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| ClientError::NoRuntime(e.to_string()))
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}

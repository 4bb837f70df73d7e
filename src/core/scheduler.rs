//! Bounded scheduler: FIFO admission of async work units under a fixed ceiling.
//!
//! Every call to the rate-limited platform API runs inside
//! [`BoundedScheduler::schedule`]. The scheduler keeps two pieces of state
//! behind one short-lived `parking_lot::Mutex`:
//!
//! - `active`: work units currently holding a slot (`0 <= active <= ceiling`)
//! - `pending`: waiters in admission order
//!
//! When a running unit finishes, its slot is handed directly to the head of
//! `pending` instead of being returned to the pool, so a unit submitted while
//! others are waiting can never overtake them. Slots are released by a drop
//! guard, which covers success, failure, panics, and callers that abandon the
//! returned future.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::ClientError;

/// Point-in-time view of scheduler utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Maximum concurrently running work units.
    pub ceiling: usize,
    /// Work units currently running.
    pub active: usize,
    /// Work units waiting for a slot.
    pub pending: usize,
    /// Total work units that have been given a slot.
    pub admitted: u64,
    /// Total work units that have released their slot.
    pub completed: u64,
}

struct Waiter {
    ticket: u64,
    wake: oneshot::Sender<()>,
}

struct SlotState {
    active: usize,
    pending: VecDeque<Waiter>,
}

struct SchedulerInner {
    ceiling: usize,
    state: Mutex<SlotState>,
    next_ticket: AtomicU64,
    admitted: AtomicU64,
    completed: AtomicU64,
}

impl SchedulerInner {
    /// Give the slot to the oldest live waiter, or return it to the pool.
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.pending.pop_front() {
            if waiter.wake.send(()).is_ok() {
                tracing::debug!(
                    ticket = waiter.ticket,
                    active = state.active,
                    pending = state.pending.len(),
                    "slot handed to queued work unit"
                );
                return;
            }
        }
        state.active = state.active.saturating_sub(1);
        tracing::trace!(active = state.active, "slot released");
    }
}

/// Concurrency ceiling shared by every caller holding a clone of this handle.
///
/// ```rust,ignore
/// let scheduler = BoundedScheduler::new(4)?;
/// let body = scheduler.schedule(|| async { transport.call::<Value>(&req).await }).await?;
/// ```
#[derive(Clone)]
pub struct BoundedScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for BoundedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl BoundedScheduler {
    /// Create a scheduler admitting at most `ceiling` concurrent work units.
    pub fn new(ceiling: usize) -> Result<Self, ClientError> {
        if ceiling == 0 {
            return Err(ClientError::InvalidConfig(
                "scheduler ceiling must be greater than 0".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                ceiling,
                state: Mutex::new(SlotState {
                    active: 0,
                    pending: VecDeque::new(),
                }),
                next_ticket: AtomicU64::new(0),
                admitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        })
    }

    /// Configured ceiling.
    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    /// Run `unit` once a slot is free and return its output unchanged.
    ///
    /// The slot is held until the unit's future completes (or is dropped).
    /// Dropping the returned future while still queued withdraws the unit
    /// without disturbing the order of the remaining waiters.
    pub async fn schedule<F, Fut, T>(&self, unit: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        unit().await
    }

    /// Current utilization.
    pub fn stats(&self) -> SchedulerStats {
        let (active, pending) = {
            let state = self.inner.state.lock();
            (state.active, state.pending.len())
        };
        SchedulerStats {
            ceiling: self.inner.ceiling,
            active,
            pending,
            admitted: self.inner.admitted.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
        }
    }

    async fn acquire(&self) -> SlotGuard {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let wake = {
            let mut state = self.inner.state.lock();
            if state.active < self.inner.ceiling && state.pending.is_empty() {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.pending.push_back(Waiter { ticket, wake: tx });
                tracing::debug!(
                    ticket,
                    active = state.active,
                    pending = state.pending.len(),
                    "work unit queued"
                );
                Some(rx)
            }
        };

        let Some(wake) = wake else {
            tracing::trace!(ticket, "work unit admitted immediately");
            return self.admit();
        };

        let mut queued = QueuedAdmission {
            inner: Arc::clone(&self.inner),
            ticket,
            wake: Some(wake),
        };
        queued.wait().await;
        self.admit()
    }

    fn admit(&self) -> SlotGuard {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
        SlotGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Holds one slot; releasing it on drop is the only way `active` goes down.
struct SlotGuard {
    inner: Arc<SchedulerInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
        self.inner.release();
    }
}

/// A queued waiter. If dropped before admission it leaves the queue, and if a
/// slot reached it in the meantime the slot is passed on.
struct QueuedAdmission {
    inner: Arc<SchedulerInner>,
    ticket: u64,
    wake: Option<oneshot::Receiver<()>>,
}

impl QueuedAdmission {
    /// Wait for the slot to be handed over.
    ///
    /// A waiter's sender is dropped unsent only by `release` after the
    /// receiver is gone, or by `Drop` below together with the receiver, so
    /// while this future is alive the wake always arrives.
    async fn wait(&mut self) {
        if let Some(wake) = self.wake.as_mut() {
            let handed_over = wake.await.is_ok();
            debug_assert!(handed_over, "queued waiter lost its sender without a hand-off");
        }
        self.wake = None;
    }
}

impl Drop for QueuedAdmission {
    fn drop(&mut self) {
        let Some(mut wake) = self.wake.take() else {
            return;
        };
        {
            let mut state = self.inner.state.lock();
            if let Some(pos) = state.pending.iter().position(|w| w.ticket == self.ticket) {
                state.pending.remove(pos);
                tracing::debug!(ticket = self.ticket, "queued work unit withdrawn");
                return;
            }
        }
        // Already popped by a releaser, which sends while holding the lock.
        if wake.try_recv().is_ok() {
            self.inner.release();
        }
    }
}

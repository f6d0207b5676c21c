use parking_lot::Mutex;
use std::{collections::VecDeque, future::Future, sync::Arc};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum QueueError {
    /// Queued work was discarded by [`BoundedQueue::clear`] before it started.
    #[error("queued work superseded before it started")]
    Superseded,
}

#[derive(Debug)]
struct Waiter {
    tx: oneshot::Sender<QueuePermit>,
}

#[derive(Debug)]
struct Inner {
    max_concurrent: usize,
    running: usize,
    waiters: VecDeque<Waiter>,
}

/// FIFO admission controlled executor.
///
/// At most `max_concurrent` tasks execute at once. Tasks beyond the limit wait in submission order
/// and are started strictly in that order as slots free up. A finishing task hands its slot
/// directly to the oldest waiter, so later submissions can never overtake queued ones.
#[derive(Debug, Clone)]
pub struct BoundedQueue {
    inner: Arc<Mutex<Inner>>,
}

impl BoundedQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                max_concurrent: max_concurrent.max(1),
                running: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Execute `task` once a slot is available, returning its output.
    ///
    /// Returns [`QueueError::Superseded`] if the task was discarded by [`BoundedQueue::clear`]
    /// before it started. A started task always runs to completion.
    pub async fn add<F, Fut, T>(&self, task: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.acquire().await?;
        let output = task().await;
        drop(permit);
        Ok(output)
    }

    /// Wait for an execution slot. The slot is held until the returned [`QueuePermit`] is
    /// dropped.
    pub async fn acquire(&self) -> Result<QueuePermit, QueueError> {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.running < inner.max_concurrent && inner.waiters.is_empty() {
                inner.running += 1;
                return Ok(QueuePermit {
                    inner: Some(Arc::clone(&self.inner)),
                });
            }

            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(Waiter { tx });
            rx
        };

        rx.await.map_err(|_| QueueError::Superseded)
    }

    /// Discard all not yet started work, rejecting each with [`QueueError::Superseded`].
    ///
    /// Running work is unaffected. Returns the number of discarded tasks.
    pub fn clear(&self) -> usize {
        let discarded = std::mem::take(&mut self.inner.lock().waiters);
        let count = discarded.iter().filter(|waiter| !waiter.tx.is_closed()).count();
        drop(discarded);

        if count > 0 {
            debug!(discarded = count, "BoundedQueue cleared pending work");
        }
        count
    }

    /// Number of currently executing tasks.
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Number of tasks waiting for a slot.
    pub fn pending(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

/// Execution slot of a [`BoundedQueue`], released (or handed to the next waiter) on drop.
#[derive(Debug)]
pub struct QueuePermit {
    inner: Option<Arc<Mutex<Inner>>>,
}

impl Drop for QueuePermit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            release(&inner);
        }
    }
}

fn release(shared: &Arc<Mutex<Inner>>) {
    let mut inner = shared.lock();
    while let Some(waiter) = inner.waiters.pop_front() {
        let permit = QueuePermit {
            inner: Some(Arc::clone(shared)),
        };

        match waiter.tx.send(permit) {
            Ok(()) => return,
            // Waiter abandoned, defuse the permit so it does not re-enter the lock
            Err(mut permit) => permit.inner = None,
        }
    }
    inner.running = inner.running.saturating_sub(1);
}

//! Bounded-concurrency FIFO admission gate
//!
//! `execute` enqueues work and resolves with its result once a slot frees
//! up. At most `max_concurrent_requests` jobs run at once; completion of
//! any job dispatches the next queued one. A job still waiting past the
//! queue timeout fails without ever executing — the timeout bounds time
//! *in the queue*, not execution time.

use crate::config::QueueConfig;
use crate::error::{LedgerError, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};

/// Point-in-time queue counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub submitted: u64,
    pub completed: u64,
    pub timed_out: u64,
}

struct QueuedJob {
    id: u64,
    submitted_at: Instant,
    run: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct QueueState {
    queued: VecDeque<QueuedJob>,
    running: usize,
}

struct QueueInner {
    max_concurrent: usize,
    queue_timeout: Duration,
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
}

impl QueueInner {
    /// Start queued jobs while slots are free; must hold the state lock
    fn dispatch(inner: &Arc<QueueInner>, state: &mut QueueState) {
        while state.running < inner.max_concurrent {
            let Some(job) = state.queued.pop_front() else {
                break;
            };

            // Expired in the queue: dropping `run` closes the waiter's
            // channel, which it reports as a queue timeout.
            if job.submitted_at.elapsed() > inner.queue_timeout {
                inner.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job = job.id, "Dropping request that expired in the queue");
                continue;
            }

            state.running += 1;
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                job.run.await;
                inner.completed.fetch_add(1, Ordering::Relaxed);

                let mut state = inner.state.lock().await;
                state.running -= 1;
                Self::dispatch(&inner, &mut state);
            });
        }
    }
}

/// FIFO request queue with a fixed concurrency budget
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                max_concurrent: config.max_concurrent_requests.max(1),
                queue_timeout: Duration::from_millis(config.queue_timeout_ms),
                state: Mutex::new(QueueState::default()),
                next_id: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                timed_out: AtomicU64::new(0),
            }),
        }
    }

    /// Run `op` under the concurrency budget, preserving FIFO order among
    /// queued requests
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.submitted.fetch_add(1, Ordering::Relaxed);

        let (tx, mut rx) = oneshot::channel::<Result<T>>();
        let run: BoxFuture<'static, ()> = Box::pin(async move {
            let result = op().await;
            let _ = tx.send(result);
        });

        let submitted_at = Instant::now();
        {
            let mut state = inner.state.lock().await;
            state.queued.push_back(QueuedJob {
                id,
                submitted_at,
                run,
            });
            QueueInner::dispatch(&inner, &mut state);
        }

        let timeout_err = || LedgerError::QueueTimeout {
            waited_ms: submitted_at.elapsed().as_millis() as u64,
        };

        tokio::select! {
            result = &mut rx => result.unwrap_or_else(|_| Err(timeout_err())),
            _ = tokio::time::sleep(inner.queue_timeout) => {
                // Still queued? Remove it so it never executes.
                let was_queued = {
                    let mut state = inner.state.lock().await;
                    let before = state.queued.len();
                    state.queued.retain(|job| job.id != id);
                    before != state.queued.len()
                };

                if was_queued {
                    inner.timed_out.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        job = id,
                        waited_ms = submitted_at.elapsed().as_millis() as u64,
                        "Request timed out waiting for an execution slot"
                    );
                    Err(timeout_err())
                } else {
                    // Already running; the queue timeout no longer applies
                    rx.await.unwrap_or_else(|_| Err(timeout_err()))
                }
            }
        }
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock().await;
        QueueStatus {
            queued: state.queued.len(),
            running: state.running,
            max_concurrent: self.inner.max_concurrent,
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            timed_out: self.inner.timed_out.load(Ordering::Relaxed),
        }
    }
}

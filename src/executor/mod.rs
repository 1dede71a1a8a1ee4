//! Per-vhost FIFO queue plus adaptive worker pool that invokes handlers
//! (§4.6). Each handler invocation runs as its own spawned task so a
//! panicking handler only fails that task's `JoinHandle` (mirroring the
//! source's catch-all around a thrown exception) instead of taking down
//! the worker loop driving the rest of the queue.

pub mod request_instance;

pub use request_instance::{HandlerOutcome, RequestInstance, RequestMethod};

use crate::errors::ExecutorError;
use crate::limits::ExecutorLimits;
use crossbeam::queue::SegQueue;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A handler bound into a [`crate::vhost::registry::Registry`] route.
/// Takes the request by value since it is handed off to its own task.
pub type HandlerFn = Arc<dyn Fn(RequestInstance) -> BoxFuture<HandlerOutcome> + Send + Sync>;

struct Job {
    request: RequestInstance,
    handler: HandlerFn,
    reply: oneshot::Sender<HandlerOutcome>,
}

/// Bounded-by-policy FIFO and worker pool for one virtual host.
pub struct Executor {
    queue: Arc<SegQueue<Job>>,
    limits: ExecutorLimits,
    target_workers: AtomicUsize,
    live_workers: AtomicUsize,
}

impl Executor {
    /// Builds the executor and spawns its initial `base` workers plus the
    /// 1 Hz resize timer (§4.6).
    pub fn new(limits: ExecutorLimits) -> Result<Arc<Self>, ExecutorError> {
        if limits.base > limits.hard_max {
            return Err(ExecutorError::InvalidSizing {
                base: limits.base,
                hard_max: limits.hard_max,
            });
        }

        let executor = Arc::new(Self {
            queue: Arc::new(SegQueue::new()),
            limits,
            target_workers: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(0),
        });

        executor.resize_to(executor.limits.base);
        executor.spawn_resize_timer();

        Ok(executor)
    }

    /// Enqueues `request` to be run by `handler`, returning its outcome once
    /// a worker has processed it.
    pub async fn submit(&self, request: RequestInstance, handler: HandlerFn) -> HandlerOutcome {
        let (reply, rx) = oneshot::channel();
        self.queue.push(Job {
            request,
            handler,
            reply,
        });

        rx.await
            .unwrap_or_else(|_| HandlerOutcome::failed(b"executor worker dropped".to_vec()))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The number of workers actually running right now (as opposed to
    /// [`Self::target_workers`]'s most recently requested size).
    pub fn worker_count(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Sets the target worker count. Growth spawns `desired - live`
    /// immediately; shrinking is graceful — excess workers exit the next
    /// time they observe `live_workers > target_workers` (§4.6).
    fn resize_to(self: &Arc<Self>, desired: usize) {
        self.target_workers.store(desired, Ordering::SeqCst);

        let live = self.live_workers.load(Ordering::SeqCst);
        for _ in live..desired {
            self.spawn_worker();
        }
    }

    fn spawn_worker(self: &Arc<Self>) {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
        let executor = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                if executor.try_exit_on_shrink() {
                    return;
                }

                let Some(job) = executor.queue.pop() else {
                    sleep(Duration::from_secs(1)).await;
                    continue;
                };

                let Job {
                    request,
                    handler,
                    reply,
                } = job;

                let task = tokio::spawn(async move { (handler)(request).await });
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(join_err) if join_err.is_panic() => {
                        warn!("handler panicked during request handling");
                        HandlerOutcome::failed(b"handler panicked".to_vec())
                    }
                    Err(_) => HandlerOutcome::failed(b"handler task cancelled".to_vec()),
                };

                let _ = reply.send(outcome);
            }
        });
    }

    /// Claims one unit of shrink if `live_workers` is still above
    /// `target_workers`, decrementing the live count and returning `true`
    /// for exactly one caller per unit of excess (races lose the
    /// compare-exchange and loop back to re-check, never over-shrinking).
    fn try_exit_on_shrink(self: &Arc<Self>) -> bool {
        loop {
            let target = self.target_workers.load(Ordering::SeqCst);
            let live = self.live_workers.load(Ordering::SeqCst);
            if live <= target {
                return false;
            }
            if self
                .live_workers
                .compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn spawn_resize_timer(self: &Arc<Self>) {
        let executor = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(1)).await;

                let queue_len = executor.queue_len();
                let step = executor.limits.queue_step.max(1);
                let desired = (executor.limits.base + queue_len / step).min(executor.limits.hard_max);
                let current = executor.target_workers.load(Ordering::SeqCst);

                if desired != current {
                    info!(from = current, to = desired, queue_len, "executor resized");
                    executor.resize_to(desired);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> RequestInstance {
        RequestInstance {
            method: RequestMethod::Get,
            vhost_name: "default".into(),
            path: "/".into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
            created_at: std::time::Instant::now(),
        }
    }

    #[tokio::test]
    async fn submit_runs_handler_and_returns_outcome() {
        let executor = Executor::new(ExecutorLimits::default()).unwrap();
        let handler: HandlerFn =
            Arc::new(|r: RequestInstance| Box::pin(async move { HandlerOutcome::ok(r.path.into_bytes()) }));

        let outcome = executor.submit(req(), handler).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.body, b"/");
    }

    #[tokio::test]
    async fn panicking_handler_becomes_failure() {
        let executor = Executor::new(ExecutorLimits::default()).unwrap();
        let handler: HandlerFn = Arc::new(|_: RequestInstance| Box::pin(async move { panic!("boom") }));

        let outcome = executor.submit(req(), handler).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.effective_status_line(), "500 Internal Server Error");
    }

    #[test]
    fn invalid_sizing_is_rejected() {
        let limits = ExecutorLimits {
            base: 100,
            hard_max: 10,
            ..ExecutorLimits::default()
        };
        assert!(matches!(
            Executor::new(limits),
            Err(ExecutorError::InvalidSizing { .. })
        ));
    }
}

//! Timer Service (§4.7): one-shot and periodic timers for connection
//! deadlines and executor resize ticks, with idempotent cancellation and a
//! time-budgeted cleanup sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::trace;

/// Handle to a scheduled timer. Cancelling is idempotent: a second
/// `cancel()` on an already-cancelled or already-fired timer is a no-op.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Requests cancellation. The entry is reaped from the service's
    /// bookkeeping table by the next cleanup sweep, not synchronously.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// How a scheduled callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireStatus {
    Normal,
    Cancelled,
}

struct Entry {
    cancelled: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

/// A single background event loop dispatching one-shot and periodic
/// timers. Each `TimerService` owns a bookkeeping table of live entries so
/// its cleanup sweep can reap cancelled/finished ones without scanning the
/// whole process's timer state.
pub struct TimerService {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl TimerService {
    pub fn new() -> Arc<Self> {
        let service = Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        });
        service.spawn_cleanup_loop();
        service
    }

    /// Schedules `callback` to run once after `delay`, unless cancelled
    /// first. `callback` receives the [`FireStatus`].
    pub fn schedule_once<F>(self: &Arc<Self>, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce(FireStatus) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        self.entries.lock().unwrap().insert(
            id,
            Entry {
                cancelled: Arc::clone(&cancelled),
                done: Arc::clone(&done),
            },
        );

        let done_flag = Arc::clone(&done);
        let cancelled_task = Arc::clone(&cancelled);
        tokio::spawn(async move {
            sleep(delay).await;
            let status = if cancelled_task.load(Ordering::SeqCst) {
                FireStatus::Cancelled
            } else {
                FireStatus::Normal
            };
            callback(status);
            done_flag.store(true, Ordering::SeqCst);
        });

        TimerHandle { id, cancelled }
    }

    /// Schedules `callback` to run every `interval` until cancelled.
    pub fn schedule_periodic<F>(self: &Arc<Self>, interval: Duration, mut callback: F) -> TimerHandle
    where
        F: FnMut(FireStatus) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        self.entries.lock().unwrap().insert(
            id,
            Entry {
                cancelled: Arc::clone(&cancelled),
                done: Arc::clone(&done),
            },
        );

        let cancelled_loop = Arc::clone(&cancelled);
        let done_flag = Arc::clone(&done);
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if cancelled_loop.load(Ordering::SeqCst) {
                    callback(FireStatus::Cancelled);
                    break;
                }
                callback(FireStatus::Normal);
            }
            done_flag.store(true, Ordering::SeqCst);
        });

        TimerHandle { id, cancelled }
    }

    /// Reaps entries whose task has finished (fired or been cancelled),
    /// spending no more than ~5ms per sweep; leaves the remainder for the
    /// next call. Bailing out early is ordinary progress, not an error.
    pub fn cleanup(&self) {
        let budget = Duration::from_millis(5);
        let started = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        let mut to_remove = Vec::new();
        for (&id, entry) in entries.iter() {
            if started.elapsed() > budget {
                trace!(reaped = to_remove.len(), "timer cleanup sweep budget exhausted, deferring rest");
                break;
            }
            if entry.done.load(Ordering::SeqCst) {
                to_remove.push(id);
            }
        }

        for id in to_remove {
            entries.remove(&id);
        }
    }

    fn spawn_cleanup_loop(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_millis(100)).await;
                service.cleanup();
            }
        });
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn one_shot_fires_once() {
        let service = TimerService::new();
        let (tx, rx) = mpsc::channel();
        service.schedule_once(Duration::from_millis(10), move |status| {
            tx.send(status).unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_recv().unwrap(), FireStatus::Normal);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_observed_on_fire() {
        let service = TimerService::new();
        let (tx, rx) = mpsc::channel();
        let handle = service.schedule_once(Duration::from_millis(20), move |status| {
            tx.send(status).unwrap();
        });

        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.try_recv().unwrap(), FireStatus::Cancelled);
    }

    #[tokio::test]
    async fn cleanup_reaps_finished_entries() {
        let service = TimerService::new();
        service.schedule_once(Duration::from_millis(5), |_| {});
        tokio::time::sleep(Duration::from_millis(40)).await;
        service.cleanup();
        assert_eq!(service.live_count(), 0);
    }
}

//! Concurrency limiter for expensive scrape work
//!
//! Admits at most `max` tasks at a time; the rest queue in FIFO order
//! (tokio's semaphore is fair). A task holds its slot from the moment it
//! starts executing until it returns, on both the success and failure
//! paths, so failures never poison the limiter. Queued tasks cannot be
//! withdrawn; callers enforce timeouts inside the task body.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// FIFO concurrency limiter
#[derive(Clone)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl Limiter {
    /// Create a limiter admitting at most `max` concurrent tasks (clamped to >= 1)
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Maximum number of concurrently admitted tasks
    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run a task once a slot is free. The slot is released when the task
    /// returns, whatever the outcome.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is owned by the limiter and never closed.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("limiter semaphore closed");
        task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_max_is_clamped() {
        assert_eq!(Limiter::new(0).max(), 1);
        assert_eq!(Limiter::new(4).max(), 4);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_max() {
        let limiter = Limiter::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_failure_releases_slot() {
        let limiter = Limiter::new(1);

        let out: Result<(), &str> = limiter.run(async { Err("boom") }).await;
        assert!(out.is_err());

        // The slot must be free again for the next task
        let out = limiter.run(async { 42 }).await;
        assert_eq!(out, 42);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_tasks_start_in_submission_order() {
        let limiter = Limiter::new(1);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        order.lock().push(i);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    })
                    .await;
            }));
            // Give each spawned task a chance to enqueue before the next
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }
}

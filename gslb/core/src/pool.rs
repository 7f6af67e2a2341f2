// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Elastic worker pool for health check jobs.
//!
//! The pool keeps a minimum number of workers alive and grows on demand:
//! when the job queue is full at enqueue time, one extra worker is spawned
//! before the job is queued, so the enqueue can never wedge behind a stuck
//! queue. Extra workers drain back down after sitting idle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Workers exit after this long without a job, if above the minimum.
pub const IDLE_STOP: Duration = Duration::from_secs(30);

/// Opaque error type carried from job execution to `on_failure`.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of work processed by the pool.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Performs the work.
    async fn execute(&self) -> Result<(), JobError>;
    /// Invoked when [Self::execute] returned `Ok`.
    fn on_success(&self);
    /// Invoked when [Self::execute] returned an error.
    fn on_failure(&self, err: JobError);
}

/// Errors returned by [WorkerPool::put].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was stopped; the job was not enqueued.
    #[error("put on closed worker pool")]
    PutOnClosedPool,
}

struct PoolInner {
    min_workers: usize,
    jobs_tx: flume::Sender<Arc<dyn Job>>,
    jobs_rx: flume::Receiver<Arc<dyn Job>>,
    quit: CancellationToken,
    closed: AtomicBool,
    worker_count: Mutex<usize>,
    tracker: TaskTracker,
}

/// Elastic pool of check workers over a bounded job queue.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Creates a stopped pool with `min_workers` baseline workers and a
    /// job queue of `buffer_size` slots. The buffer must at least cover
    /// the baseline so a full queue reliably signals missing capacity.
    pub fn new(min_workers: usize, buffer_size: usize) -> Self {
        let (jobs_tx, jobs_rx) = flume::bounded(buffer_size.max(1));
        WorkerPool {
            inner: Arc::new(PoolInner {
                min_workers,
                jobs_tx,
                jobs_rx,
                quit: CancellationToken::new(),
                closed: AtomicBool::new(true),
                worker_count: Mutex::new(0),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Spawns the baseline workers and opens the pool for jobs.
    pub fn start(&self) {
        self.inner.closed.store(false, Ordering::Release);
        for _ in 0..self.inner.min_workers {
            self.spawn_worker();
        }
        tracing::debug!(workers = self.inner.min_workers, "worker pool started");
    }

    /// Enqueues a job without blocking on a full queue.
    ///
    /// A full queue spawns one extra worker before enqueueing; the new
    /// worker is already draining, so the subsequent send completes
    /// promptly.
    pub async fn put(&self, job: Arc<dyn Job>) -> Result<(), PoolError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::PutOnClosedPool);
        }

        if self.inner.jobs_tx.is_full() {
            self.spawn_worker();
        }

        self.inner
            .jobs_tx
            .send_async(job)
            .await
            .map_err(|_| PoolError::PutOnClosedPool)
    }

    /// Stops the pool: rejects further puts, broadcasts shutdown, and
    /// waits for workers to drain the queue and exit.
    pub async fn stop(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.quit.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::debug!("worker pool stopped");
    }

    /// Number of currently running workers.
    pub fn num_workers(&self) -> usize {
        *self.inner.worker_count.lock()
    }

    fn spawn_worker(&self) {
        let inner = self.inner.clone();
        *inner.worker_count.lock() += 1;

        let worker = async move {
            loop {
                tokio::select! {
                    job = inner.jobs_rx.recv_async() => {
                        match job {
                            Ok(job) => run_job(job).await,
                            Err(_) => break,
                        }
                    }
                    _ = inner.quit.cancelled() => {
                        // Drain whatever is already queued, then exit.
                        while let Ok(job) = inner.jobs_rx.try_recv() {
                            run_job(job).await;
                        }
                        break;
                    }
                    _ = tokio::time::sleep(IDLE_STOP) => {
                        let mut count = inner.worker_count.lock();
                        if *count > inner.min_workers {
                            *count -= 1;
                            return;
                        }
                    }
                }
            }

            *inner.worker_count.lock() -= 1;
        };

        self.inner.tracker.spawn(worker);
    }
}

async fn run_job(job: Arc<dyn Job>) {
    match job.execute().await {
        Ok(()) => job.on_success(),
        Err(err) => job.on_failure(err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingJob {
        succeed: bool,
        successes: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Job for CountingJob {
        async fn execute(&self) -> Result<(), JobError> {
            if self.succeed {
                Ok(())
            } else {
                Err("synthetic failure".into())
            }
        }

        fn on_success(&self) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _err: JobError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SlowJob {
        done: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Job for SlowJob {
        async fn execute(&self) -> Result<(), JobError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }

        fn on_success(&self) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _err: JobError) {}
    }

    #[tokio::test]
    async fn dispatches_success_and_failure() {
        let pool = WorkerPool::new(2, 4);
        pool.start();

        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        for succeed in [true, true, false] {
            pool.put(Arc::new(CountingJob {
                succeed,
                successes: successes.clone(),
                failures: failures.clone(),
            }))
            .await
            .unwrap();
        }

        pool.stop().await;
        assert_eq!(successes.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn put_on_stopped_pool_is_rejected() {
        let pool = WorkerPool::new(1, 2);
        pool.start();
        pool.stop().await;

        let result = pool
            .put(Arc::new(CountingJob {
                succeed: true,
                successes: Arc::new(AtomicUsize::new(0)),
                failures: Arc::new(AtomicUsize::new(0)),
            }))
            .await;
        assert_eq!(result, Err(PoolError::PutOnClosedPool));
    }

    #[tokio::test]
    async fn unstarted_pool_rejects_jobs() {
        let pool = WorkerPool::new(1, 2);
        let result = pool
            .put(Arc::new(CountingJob {
                succeed: true,
                successes: Arc::new(AtomicUsize::new(0)),
                failures: Arc::new(AtomicUsize::new(0)),
            }))
            .await;
        assert_eq!(result, Err(PoolError::PutOnClosedPool));
    }

    #[tokio::test]
    async fn grows_past_minimum_under_load() {
        let pool = WorkerPool::new(1, 1);
        pool.start();
        assert_eq!(pool.num_workers(), 1);

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            pool.put(Arc::new(SlowJob { done: done.clone() })).await.unwrap();
        }
        assert!(pool.num_workers() > 1, "pool did not grow");

        pool.stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workers_shrink_to_minimum() {
        let pool = WorkerPool::new(1, 1);
        pool.start();

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            pool.put(Arc::new(SlowJob { done: done.clone() })).await.unwrap();
        }
        let grown = pool.num_workers();
        assert!(grown > 1);

        // Let every job finish, then sit past the idle threshold.
        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::time::sleep(IDLE_STOP + Duration::from_secs(5)).await;
        // Yield so idle workers get to observe the timeout.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(pool.num_workers(), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_drains_queued_jobs() {
        let pool = WorkerPool::new(1, 8);
        pool.start();

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            pool.put(Arc::new(SlowJob { done: done.clone() })).await.unwrap();
        }
        pool.stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }
}

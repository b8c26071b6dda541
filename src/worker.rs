//! Bounded worker pool with same-kind/same-handle batching (C7).
//!
//! Workers are plain tasks pulling from a bounded `async_channel`; when the
//! queue is full the submitter executes inline rather than blocking
//! (backpressure via direct work, per the spec). Batching groups pending
//! operations by `(BatchType, handle)` in a `dashmap`; a batch closes on
//! size or a timer, whichever comes first, and is handed to a single
//! worker as one unit so the backing file is opened only once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use dashmap::DashMap;
use tokio::task::JoinSet;

/// The unit of work submitted to the pool: a boxed future producing no
/// value, since callers observe completion through their own oneshot/result
/// channel embedded in the closure.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchType {
    Read,
    Write,
    GetAttr,
    SetAttr,
    DirRead,
}

/// Configuration mirroring the exported-options snapshot fields relevant to
/// the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub batch_enabled: bool,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
}

impl WorkerConfig {
    pub fn with_default_worker_count() -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        WorkerConfig {
            max_workers: cores * 4,
            queue_capacity: 4096,
            batch_enabled: true,
            max_batch_size: 32,
            batch_timeout: Duration::from_millis(10),
        }
    }
}

/// A fixed-size pool of worker tasks draining a shared bounded queue.
pub struct WorkerPool {
    sender: Sender<Job>,
    workers: JoinSet<()>,
    batches: Arc<DashMap<(BatchType, u64), Vec<Job>>>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig) -> Self {
        let (sender, receiver) = async_channel::bounded(config.queue_capacity);
        let mut workers = JoinSet::new();
        for _ in 0..config.max_workers {
            let receiver: Receiver<Job> = receiver.clone();
            workers.spawn(async move {
                while let Ok(job) = receiver.recv().await {
                    job.await;
                }
            });
        }
        WorkerPool { sender, workers, batches: Arc::new(DashMap::new()), config }
    }

    /// Submits a job, running it inline if the queue is currently full.
    pub async fn submit(&self, job: Job) {
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => job.await,
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Adds `job` to the batch for `(kind, handle)`, flushing the batch
    /// immediately if it reaches `max_batch_size`. The caller is
    /// responsible for also scheduling a timer-based flush (see
    /// [`WorkerPool::flush_after_timeout`]) since batches with few members
    /// must still close after `batch_timeout`.
    pub async fn add_to_batch(&self, kind: BatchType, handle: u64, job: Job) {
        if !self.config.batch_enabled {
            self.submit(job).await;
            return;
        }
        let should_flush = {
            let mut entry = self.batches.entry((kind, handle)).or_default();
            entry.push(job);
            entry.len() >= self.config.max_batch_size
        };
        if should_flush {
            self.flush_batch(kind, handle).await;
        }
    }

    /// Flushes whatever is pending for `(kind, handle)`, submitting every
    /// queued job as a single batch job that runs them in submission order.
    pub async fn flush_batch(&self, kind: BatchType, handle: u64) {
        let jobs = self.batches.remove(&(kind, handle)).map(|(_, v)| v);
        if let Some(jobs) = jobs {
            if jobs.is_empty() {
                return;
            }
            let batched: Job = Box::pin(async move {
                for job in jobs {
                    job.await;
                }
            });
            self.submit(batched).await;
        }
    }

    /// Schedules a flush of `(kind, handle)` after the configured batch
    /// timeout, so a batch that never reaches `max_batch_size` still
    /// closes promptly.
    pub fn flush_after_timeout(self: &Arc<Self>, kind: BatchType, handle: u64) {
        let pool = Arc::clone(self);
        let timeout = self.config.batch_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            pool.flush_batch(kind, handle).await;
        });
    }

    /// Stops accepting new work and waits for in-flight workers to drain.
    pub async fn shutdown(mut self) {
        self.sender.close();
        while self.workers.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn submitted_job_runs() {
        let pool = WorkerPool::new(WorkerConfig::with_default_worker_count());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        pool.submit(Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_flushes_at_max_size() {
        let config = WorkerConfig { max_batch_size: 2, ..WorkerConfig::with_default_worker_count() };
        let pool = Arc::new(WorkerPool::new(config));
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = Arc::clone(&counter);
            pool.add_to_batch(BatchType::Read, 1, Box::pin(async move { c.fetch_add(1, Ordering::SeqCst) ; }))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}

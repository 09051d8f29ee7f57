//! In-process background job queues, grounded on
//! `memory-queue/{queue.go,blocking.go,backoff.go,recovery.go}`. Go's
//! goroutine-per-job plus `recover()` maps onto `tokio::task::spawn`, whose
//! `JoinHandle` already isolates a panicking task's unwind into a
//! `JoinError` — there's no need to hand-roll `catch_unwind` to get the same
//! guarantee.

mod backoff;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex, Semaphore},
    task::JoinSet,
};

pub use backoff::default_backoff;

pub type Job = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct JobRecord {
    job: Job,
    max_tries: u32,
}

/// A background queue that retries a failing job with jittered backoff up to
/// `max_tries` times, bounded to `concurrency` jobs running at once. Mirrors
/// `memory-queue.JobQueue`.
pub struct RetryingJobQueue {
    sender: mpsc::Sender<JobRecord>,
    in_flight: Arc<AsyncMutex<JoinSet<()>>>,
}

impl RetryingJobQueue {
    pub fn new(concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        let in_flight = Arc::new(AsyncMutex::new(JoinSet::new()));
        tokio::spawn(Self::dispatch(receiver, concurrency, in_flight.clone()));
        Self { sender, in_flight }
    }

    async fn dispatch(
        mut receiver: mpsc::Receiver<JobRecord>,
        concurrency: usize,
        in_flight: Arc<AsyncMutex<JoinSet<()>>>,
    ) {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        while let Some(record) = receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let mut in_flight = in_flight.lock().await;
            in_flight.spawn(async move {
                let _permit = permit;
                Self::run_with_retries(record).await;
            });
        }
    }

    async fn run_with_retries(record: JobRecord) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match (record.job)().await {
                Ok(()) => return,
                Err(err) => {
                    if attempts >= record.max_tries.max(1) {
                        tracing::warn!(attempts, %err, "job failed after final attempt");
                        return;
                    }
                    tokio::time::sleep(default_backoff(attempts)).await;
                },
            }
        }
    }

    /// Enqueues `job`, retrying up to `max_tries` times (floored to 1) on
    /// failure. Returns immediately; the job runs on a background task.
    pub async fn add(&self, job: Job, max_tries: u32) {
        let _ = self
            .sender
            .send(JobRecord {
                job,
                max_tries: max_tries.max(1),
            })
            .await;
    }

    /// Waits for every job enqueued so far to finish (successfully or after
    /// exhausting retries).
    pub async fn wait(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.join_next().await.is_some() {}
    }
}

/// A queue whose `add` blocks the caller once `concurrency` jobs are
/// in-flight, applying backpressure instead of buffering unboundedly. Mirrors
/// `memory-queue.BlockingJobQueue`; used by the flush sweep to cap how many
/// uploads run at once (per spec.md §4.3).
pub struct BlockingJobQueue {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AsyncMutex<JoinSet<anyhow::Result<()>>>>,
}

impl BlockingJobQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: Arc::new(AsyncMutex::new(JoinSet::new())),
        }
    }

    /// Blocks until a concurrency slot is free, then spawns `job`.
    pub async fn add_and_block_if_full(&self, job: BoxFuture<'static, anyhow::Result<()>>) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        let mut in_flight = self.in_flight.lock().await;
        in_flight.spawn(async move {
            let _permit = permit;
            job.await
        });
    }

    /// Waits for all spawned jobs to finish, returning the first error seen
    /// (later errors are logged and dropped), mirroring `BlockingJobQueue.Wait`.
    pub async fn wait(&self) -> anyhow::Result<()> {
        let mut in_flight = self.in_flight.lock().await;
        let mut first_err = None;
        while let Some(result) = in_flight.join_next().await {
            let job_result = match result {
                Ok(job_result) => job_result,
                Err(join_err) => Err(anyhow::anyhow!("job panicked: {join_err}")),
            };
            if let Err(err) = job_result {
                tracing::warn!(%err, "job failed");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;

    #[tokio::test]
    async fn retrying_queue_retries_until_success() {
        let queue = RetryingJobQueue::new(2);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let job: Job = Arc::new(move || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("not yet");
                }
                Ok(())
            }
            .boxed()
        });
        queue.add(job, 5).await;
        queue.wait().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_queue_gives_up_after_max_tries() {
        let queue = RetryingJobQueue::new(1);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let job: Job = Arc::new(move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always fails")
            }
            .boxed()
        });
        queue.add(job, 2).await;
        queue.wait().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blocking_queue_reports_first_error() {
        let queue = BlockingJobQueue::new(2);
        queue
            .add_and_block_if_full(async { anyhow::bail!("boom") }.boxed())
            .await;
        queue.add_and_block_if_full(async { Ok(()) }.boxed()).await;
        let result = queue.wait().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn blocking_queue_bounds_concurrency() {
        let queue = BlockingJobQueue::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let running = running.clone();
            let max_seen = max_seen.clone();
            queue
                .add_and_block_if_full(
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed(),
                )
                .await;
        }
        queue.wait().await.unwrap();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}

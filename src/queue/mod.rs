pub mod manager;
pub mod metrics;

use std::{
    cmp::Ordering as CmpOrdering,
    collections::BinaryHeap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use tokio::{
    sync::{Notify, oneshot},
    task::JoinHandle,
    time::{Duration, sleep},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{ProviderError, QueueError},
    models::{
        channel::Channel,
        job::{ChannelJob, JobResult},
        retry::RetryConfig,
    },
    providers::SendProvider,
    utils::jittered,
};

pub use manager::QueueManager;
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};

/// How long an idle worker sleeps before re-checking the queue. Wakeups are
/// normally notification-driven; this bounds the window of a missed wake.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub concurrency: usize,
    pub retry: RetryConfig,
}

/// Resolves once the job reaches a terminal state (delivered, retries
/// exhausted, or abandoned at shutdown).
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub channel: Channel,
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub async fn settled(self) -> JobResult {
        self.rx
            .await
            .unwrap_or_else(|_| JobResult::failed("queue shut down before delivery", 0))
    }
}

struct PendingJob {
    id: Uuid,
    priority: i32,
    seq: u64,
    enqueued_at: Instant,
    job: ChannelJob,
    done: oneshot::Sender<JobResult>,
}

impl PartialEq for PendingJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingJob {}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingJob {
    // Max-heap: higher priority first, FIFO within a priority level.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Waiting {
    heap: BinaryHeap<PendingJob>,
    next_seq: u64,
}

struct QueueInner {
    channel: Channel,
    provider: Arc<dyn SendProvider>,
    retry: RetryConfig,
    waiting: Mutex<Waiting>,
    notify: Notify,
    paused: AtomicBool,
    shutdown: AtomicBool,
    metrics: Arc<QueueMetrics>,
}

/// Priority-ordered job queue for one channel with a bounded worker pool.
///
/// `enqueue` is non-blocking; delivery happens on one of `concurrency`
/// worker tasks, which is the backpressure bound on concurrent provider
/// calls. Failed sends are retried with jittered exponential backoff up to
/// the configured attempt cap, then reported as terminally failed.
pub struct ChannelQueue {
    inner: Arc<QueueInner>,
    concurrency: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelQueue {
    pub fn new(channel: Channel, provider: Arc<dyn SendProvider>, options: QueueOptions) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                channel,
                provider,
                retry: options.retry,
                waiting: Mutex::new(Waiting::default()),
                notify: Notify::new(),
                paused: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                metrics: Arc::new(QueueMetrics::new(channel.queue_name())),
            }),
            concurrency: options.concurrency,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Initializes the provider and starts the worker pool. Jobs enqueued
    /// before this call simply wait.
    pub async fn initialize(&self) -> Result<(), ProviderError> {
        self.inner.provider.initialize().await?;

        let mut workers = self.workers.lock().unwrap();
        for _ in 0..self.concurrency {
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(worker_loop(inner)));
        }

        info!(
            queue = self.inner.channel.queue_name(),
            concurrency = self.concurrency,
            "Channel queue initialized"
        );

        Ok(())
    }

    pub fn enqueue(&self, job: ChannelJob) -> Result<JobHandle, QueueError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Closed(self.inner.channel));
        }

        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let priority = job.metadata.priority;

        {
            let mut waiting = self.inner.waiting.lock().unwrap();
            let seq = waiting.next_seq;
            waiting.next_seq += 1;
            waiting.heap.push(PendingJob {
                id,
                priority,
                seq,
                enqueued_at: Instant::now(),
                job,
                done: tx,
            });
        }

        self.inner.metrics.job_enqueued();
        self.inner.notify.notify_one();

        debug!(
            queue = self.inner.channel.queue_name(),
            job_id = %id,
            priority,
            "Job enqueued"
        );

        Ok(JobHandle {
            job_id: id,
            channel: self.inner.channel,
            rx,
        })
    }

    /// Stops dequeuing without losing queued jobs.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
        info!(queue = self.inner.channel.queue_name(), "Queue paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.notify.notify_waiters();
        info!(queue = self.inner.channel.queue_name(), "Queue resumed");
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Shuts the pool down. In-flight jobs finish their current attempt;
    /// jobs still waiting resolve as failed.
    pub async fn close(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(
                    queue = self.inner.channel.queue_name(),
                    error = %e,
                    "Queue worker did not shut down cleanly"
                );
            }
        }

        let drained = {
            let mut waiting = self.inner.waiting.lock().unwrap();
            std::mem::take(&mut waiting.heap)
        };

        for pending in drained {
            self.inner.metrics.job_abandoned();
            let _ = pending
                .done
                .send(JobResult::failed("queue closed before delivery", 0));
        }

        info!(queue = self.inner.channel.queue_name(), "Queue closed");
    }
}

async fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        let next = if inner.paused.load(Ordering::Acquire) {
            None
        } else {
            inner.waiting.lock().unwrap().heap.pop()
        };

        match next {
            Some(pending) => process(&inner, pending).await,
            None => {
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = sleep(IDLE_POLL) => {}
                }
            }
        }
    }
}

async fn process(inner: &QueueInner, pending: PendingJob) {
    inner
        .metrics
        .job_dequeued(pending.priority, pending.enqueued_at.elapsed());

    let result = deliver(inner, &pending.job).await;

    if result.success {
        inner.metrics.job_completed();
        info!(
            queue = inner.channel.queue_name(),
            job_id = %pending.id,
            message_id = %pending.job.metadata.message_id,
            attempts = result.attempts,
            "Job completed"
        );
    } else {
        inner.metrics.job_failed();
        warn!(
            queue = inner.channel.queue_name(),
            job_id = %pending.id,
            message_id = %pending.job.metadata.message_id,
            attempts = result.attempts,
            error = result.error.as_deref().unwrap_or("unknown"),
            "Job failed terminally"
        );
    }

    // Receiver may be gone if the dispatcher gave up on the event.
    let _ = pending.done.send(result);
}

async fn deliver(inner: &QueueInner, job: &ChannelJob) -> JobResult {
    // Structural payload problems are not retryable.
    if let Err(e) = inner.provider.validate_payload(&job.payload) {
        return JobResult::failed(e.to_string(), 0);
    }

    let retry = &inner.retry;
    let mut attempt = 0;
    let mut delay_ms = retry.initial_delay_ms;

    loop {
        attempt += 1;

        let started = Instant::now();
        let outcome = inner.provider.send(&job.payload).await;
        inner.metrics.observe_provider_latency(started.elapsed());

        if outcome.success {
            return JobResult::completed(outcome.message_id, attempt);
        }

        let error = outcome
            .error
            .unwrap_or_else(|| "notification failed".to_string());

        if attempt >= retry.max_attempts {
            return JobResult::failed(error, attempt);
        }

        debug!(
            queue = inner.channel.queue_name(),
            attempt,
            max_attempts = retry.max_attempts,
            delay_ms,
            error = %error,
            "Send attempt failed, backing off"
        );

        inner.metrics.retry_scheduled();
        sleep(Duration::from_millis(jittered(delay_ms))).await;
        inner.metrics.retry_resumed();

        delay_ms = std::cmp::min(delay_ms * retry.backoff_multiplier, retry.max_delay_ms);
    }
}

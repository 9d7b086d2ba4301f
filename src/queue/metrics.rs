use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;

/// Running latency aggregate. The snapshot keeps count/total/max rather than
/// full histograms; bucketing happens in whatever scrapes `/metrics`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl LatencySummary {
    fn observe(&mut self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
    }
}

/// Lifecycle observations for one channel queue: throughput counters, depth
/// by state, queue-wait latency per priority and provider call latency.
pub struct QueueMetrics {
    queue_name: &'static str,
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    waiting: AtomicU64,
    active: AtomicU64,
    delayed: AtomicU64,
    queue_wait: Mutex<BTreeMap<i32, LatencySummary>>,
    provider_latency: Mutex<LatencySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueDepth {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueMetricsSnapshot {
    pub queue: &'static str,
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub depth: QueueDepth,
    pub queue_wait_ms_by_priority: BTreeMap<i32, LatencySummary>,
    pub provider_latency_ms: LatencySummary,
}

impl QueueMetrics {
    pub fn new(queue_name: &'static str) -> Self {
        Self {
            queue_name,
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            waiting: AtomicU64::new(0),
            active: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
            queue_wait: Mutex::new(BTreeMap::new()),
            provider_latency: Mutex::new(LatencySummary::default()),
        }
    }

    pub fn job_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.waiting.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker picked the job up after `waited` in the queue.
    pub fn job_dequeued(&self, priority: i32, waited: Duration) {
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);

        self.queue_wait
            .lock()
            .unwrap()
            .entry(priority)
            .or_default()
            .observe(waited);
    }

    pub fn job_completed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Job dropped at shutdown without ever reaching a worker.
    pub fn job_abandoned(&self) {
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.delayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_resumed(&self) {
        self.delayed.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn observe_provider_latency(&self, elapsed: Duration) {
        self.provider_latency.lock().unwrap().observe(elapsed);
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            queue: self.queue_name,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            depth: QueueDepth {
                waiting: self.waiting.load(Ordering::Relaxed),
                active: self.active.load(Ordering::Relaxed),
                delayed: self.delayed.load(Ordering::Relaxed),
            },
            queue_wait_ms_by_priority: self.queue_wait.lock().unwrap().clone(),
            provider_latency_ms: *self.provider_latency.lock().unwrap(),
        }
    }
}

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use notification_dispatcher::{
    directory::{ContactRecord, MemoryDirectory},
    dispatch::Dispatcher,
    error::ProviderError,
    idempotency::IdempotencyTracker,
    models::{
        channel::Channel,
        event::{
            ChannelSelection, EmailContent, EventMetadata, NotificationEvent, PushContent,
            Recipient, SmsContent,
        },
        job::{ChannelJob, JobMetadata, NotificationPayload},
        retry::RetryConfig,
    },
    providers::{SendOutcome, SendProvider},
    queue::{QueueManager, QueueOptions},
    store::MemoryStore,
};

/// Configurable in-process provider used across the suite.
pub struct MockProvider {
    name: String,
    fail_first: u32,
    always_fail: bool,
    delay: Option<Duration>,
    calls: AtomicU32,
    current: AtomicU32,
    max_concurrent: AtomicU32,
    payloads: Mutex<Vec<NotificationPayload>>,
}

impl MockProvider {
    pub fn succeeding() -> Self {
        Self::new("mock", 0, false)
    }

    pub fn failing() -> Self {
        Self::new("mock-failing", 0, true)
    }

    /// Fails the first `n` sends, then succeeds.
    pub fn flaky(n: u32) -> Self {
        Self::new("mock-flaky", n, false)
    }

    fn new(name: &str, fail_first: u32, always_fail: bool) -> Self {
        Self {
            name: name.to_string(),
            fail_first,
            always_fail,
            delay: None,
            calls: AtomicU32::new(0),
            current: AtomicU32::new(0),
            max_concurrent: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SendProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn validate_payload(&self, payload: &NotificationPayload) -> Result<(), ProviderError> {
        if payload.to.is_empty() {
            return Err(ProviderError::Validation(
                "recipient cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, payload: &NotificationPayload) -> SendOutcome {
        let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail || call < self.fail_first {
            SendOutcome::failure("mock send failure")
        } else {
            SendOutcome::sent(format!("mock-{call}"))
        }
    }
}

/// Fast retry policy so exhaustion tests finish quickly.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2,
    }
}

pub fn queue_options(concurrency: usize) -> QueueOptions {
    QueueOptions {
        concurrency,
        retry: fast_retry(),
    }
}

pub fn tracker_with_window(window: Duration) -> (Arc<MemoryStore>, Arc<IdempotencyTracker>) {
    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(IdempotencyTracker::new(store.clone(), window));
    (store, tracker)
}

pub fn test_tracker() -> (Arc<MemoryStore>, Arc<IdempotencyTracker>) {
    tracker_with_window(Duration::from_secs(60))
}

pub fn test_job(message_id: &str, priority: i32) -> ChannelJob {
    ChannelJob {
        payload: NotificationPayload {
            to: format!("recipient-{message_id}"),
            title: Some("title".to_string()),
            body: format!("body-{priority}"),
            data: None,
        },
        metadata: JobMetadata {
            message_id: message_id.to_string(),
            user_id: "u1".to_string(),
            priority,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    }
}

pub fn test_contact(uid: &str) -> ContactRecord {
    ContactRecord {
        uid: uid.to_string(),
        name: Some("Test User".to_string()),
        email: Some(format!("{uid}@example.com")),
        phone_number: Some("+15550001111".to_string()),
        device_token: Some("tok1".to_string()),
        whatsapp: Some("+15550002222".to_string()),
    }
}

pub fn push_event(message_id: &str) -> NotificationEvent {
    NotificationEvent {
        metadata: EventMetadata {
            message_id: message_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            priority: None,
        },
        recipient: Recipient::Native {
            id: "u1".to_string(),
        },
        channels: ChannelSelection {
            push: Some(PushContent {
                title: "T".to_string(),
                body: "B".to_string(),
                data: HashMap::new(),
            }),
            ..Default::default()
        },
    }
}

pub fn email_sms_event(message_id: &str) -> NotificationEvent {
    NotificationEvent {
        metadata: EventMetadata {
            message_id: message_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            priority: None,
        },
        recipient: Recipient::Native {
            id: "u1".to_string(),
        },
        channels: ChannelSelection {
            email: Some(EmailContent {
                subject: "subject".to_string(),
                body: "email body".to_string(),
            }),
            sms: Some(SmsContent {
                body: "sms body".to_string(),
            }),
            ..Default::default()
        },
    }
}

pub struct TestPipeline {
    pub dispatcher: Dispatcher,
    pub tracker: Arc<IdempotencyTracker>,
    pub queues: Arc<QueueManager>,
    pub providers: HashMap<Channel, Arc<MockProvider>>,
}

/// Builds a hermetic pipeline: memory store, memory directory with one user
/// ("u1"), and a mock provider per requested channel.
pub async fn test_pipeline(channel_providers: Vec<(Channel, MockProvider)>) -> TestPipeline {
    let (_, tracker) = test_tracker();

    let mut providers = HashMap::new();
    let mut manager = QueueManager::new();

    for (channel, provider) in channel_providers {
        let provider = Arc::new(provider);
        providers.insert(channel, provider.clone());
        manager.register(channel, provider, queue_options(4));
    }

    let queues = Arc::new(manager);
    queues.initialize().await.expect("queue init");

    let directory = Arc::new(MemoryDirectory::with_records([test_contact("u1")]));

    TestPipeline {
        dispatcher: Dispatcher::new(tracker.clone(), queues.clone(), directory),
        tracker,
        queues,
        providers,
    }
}

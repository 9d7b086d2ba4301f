use std::{collections::HashMap, sync::Arc};

use tracing::info;

use crate::{
    error::{ProviderError, QueueError},
    models::{channel::Channel, job::ChannelJob},
    providers::SendProvider,
    queue::{ChannelQueue, JobHandle, QueueMetricsSnapshot, QueueOptions},
};

/// Owns zero-or-one [`ChannelQueue`] per configured channel and fans jobs
/// out to them. Channels are independently optional; routing to an
/// unconfigured channel is a caller error, never retried.
#[derive(Default)]
pub struct QueueManager {
    queues: HashMap<Channel, ChannelQueue>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        channel: Channel,
        provider: Arc<dyn SendProvider>,
        options: QueueOptions,
    ) {
        self.queues
            .insert(channel, ChannelQueue::new(channel, provider, options));
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.queues.keys().copied().collect();
        channels.sort_by_key(|c| c.as_str());
        channels
    }

    pub fn is_configured(&self, channel: Channel) -> bool {
        self.queues.contains_key(&channel)
    }

    /// Initializes every configured queue's provider and worker pool. A
    /// provider that cannot initialize aborts startup.
    pub async fn initialize(&self) -> Result<(), ProviderError> {
        for (channel, queue) in &self.queues {
            queue.initialize().await?;
            info!(channel = %channel, "Notification queue ready");
        }

        Ok(())
    }

    pub fn enqueue(&self, channel: Channel, job: ChannelJob) -> Result<JobHandle, QueueError> {
        let queue = self
            .queues
            .get(&channel)
            .ok_or(QueueError::ChannelNotInitialized(channel))?;

        queue.enqueue(job)
    }

    pub fn pause(&self, channel: Channel) -> Result<(), QueueError> {
        self.queues
            .get(&channel)
            .map(ChannelQueue::pause)
            .ok_or(QueueError::ChannelNotInitialized(channel))
    }

    pub fn resume(&self, channel: Channel) -> Result<(), QueueError> {
        self.queues
            .get(&channel)
            .map(ChannelQueue::resume)
            .ok_or(QueueError::ChannelNotInitialized(channel))
    }

    pub fn metrics(&self) -> HashMap<Channel, QueueMetricsSnapshot> {
        self.queues
            .iter()
            .map(|(channel, queue)| (*channel, queue.metrics()))
            .collect()
    }

    /// Closes every configured queue, best effort: one queue failing to
    /// drain does not stop the others from closing.
    pub async fn close_all(&self) {
        for queue in self.queues.values() {
            queue.close().await;
        }
    }
}

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::{StreamExt, future::join_all};
use tracing::{debug, error, info, warn};

use crate::{
    clients::rbmq::RabbitMqClient,
    directory::{ContactRecord, UserDirectory},
    error::DispatchError,
    idempotency::IdempotencyTracker,
    models::{
        channel::Channel,
        event::{NotificationEvent, Recipient},
        job::{ChannelJob, DlqMessage, JobMetadata, NotificationPayload},
        record::ChannelOutcome,
    },
    queue::{JobHandle, QueueManager},
    utils::now_millis,
};

/// How one event left the pipeline. Duplicates and lost claims are normal
/// drops under at-least-once delivery, not errors.
#[derive(Debug)]
pub enum DispatchOutcome {
    Dispatched { channels: Vec<ChannelDispatch> },
    Duplicate,
    ClaimLost,
}

#[derive(Debug, Clone)]
pub struct ChannelDispatch {
    pub channel: Channel,
    pub success: bool,
    pub error: Option<String>,
}

/// Coordinates one event through the pipeline: validate, dedup, claim,
/// resolve the recipient, fan out per channel, reconcile each channel's
/// terminal outcome back into the idempotency record.
pub struct Dispatcher {
    tracker: Arc<IdempotencyTracker>,
    queues: Arc<QueueManager>,
    directory: Arc<dyn UserDirectory>,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<IdempotencyTracker>,
        queues: Arc<QueueManager>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            tracker,
            queues,
            directory,
        }
    }

    pub async fn handle_event(
        &self,
        event: NotificationEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        event.validate()?;

        let message_id = event.metadata.message_id.clone();

        // Fast-path dedup. Best effort only; the claim below is the single
        // source of truth under concurrent delivery.
        if self.tracker.is_processing(&message_id).await? {
            info!(message_id, "Message is already being processed, skipping");
            return Ok(DispatchOutcome::Duplicate);
        }

        if self.tracker.has_been_processed(&message_id).await? {
            info!(message_id, "Message has already been processed, skipping");
            return Ok(DispatchOutcome::Duplicate);
        }

        let active_channels = event.channels.active();

        if !self
            .tracker
            .start_processing(&message_id, &active_channels)
            .await?
        {
            info!(message_id, "Another worker claimed this message, skipping");
            return Ok(DispatchOutcome::ClaimLost);
        }

        let contact = self.resolve_recipient(&event.recipient).await?;

        // Fan out: one job per active channel whose contact field is
        // populated. A missing contact field is a silent skip.
        let mut launched: Vec<(Channel, JobHandle)> = Vec::new();
        let mut settled: Vec<ChannelDispatch> = Vec::new();
        let mut skipped: Vec<Channel> = Vec::new();

        for channel in active_channels {
            let Some(job) = build_channel_job(channel, &event, &contact) else {
                debug!(
                    message_id,
                    %channel,
                    "Recipient has no contact data for channel, skipping"
                );
                skipped.push(channel);
                continue;
            };

            match self.queues.enqueue(channel, job) {
                Ok(handle) => launched.push((channel, handle)),
                Err(e) => {
                    error!(message_id, %channel, error = %e, "Failed to enqueue channel job");
                    settled.push(ChannelDispatch {
                        channel,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // All launched channels run to their terminal state independently;
        // one channel failing never cancels the others.
        let results = join_all(launched.into_iter().map(|(channel, handle)| async move {
            let result = handle.settled().await;
            ChannelDispatch {
                channel,
                success: result.success,
                error: result.error,
            }
        }))
        .await;

        settled.extend(results);

        // Reconcile every claimed channel regardless of its result so the
        // record eventually reaches overall completion. A skipped channel
        // has nothing to deliver and closes as completed immediately. Best
        // effort across channels; a store failure still surfaces so the
        // event is retried.
        let mut outcomes: Vec<(Channel, ChannelOutcome)> = settled
            .iter()
            .map(|dispatch| {
                let outcome = if dispatch.success {
                    ChannelOutcome::Completed
                } else {
                    ChannelOutcome::Failed(
                        dispatch
                            .error
                            .clone()
                            .unwrap_or_else(|| "notification failed".to_string()),
                    )
                };
                (dispatch.channel, outcome)
            })
            .collect();

        outcomes.extend(
            skipped
                .into_iter()
                .map(|channel| (channel, ChannelOutcome::Completed)),
        );

        let mut store_failure = None;

        for (channel, outcome) in outcomes {
            if let Err(e) = self
                .tracker
                .update_channel_status(&message_id, channel, outcome)
                .await
            {
                error!(
                    message_id,
                    %channel,
                    error = %e,
                    "Failed to record channel outcome"
                );
                store_failure.get_or_insert(e);
            }
        }

        if let Some(e) = store_failure {
            return Err(e.into());
        }

        info!(
            message_id,
            attempted = settled.len(),
            failed = settled.iter().filter(|d| !d.success).count(),
            "Event dispatched"
        );

        Ok(DispatchOutcome::Dispatched { channels: settled })
    }

    async fn resolve_recipient(
        &self,
        recipient: &Recipient,
    ) -> Result<ContactRecord, DispatchError> {
        match recipient {
            Recipient::Native { id } => self
                .directory
                .find_by_uid(id)
                .await?
                .ok_or_else(|| DispatchError::RecipientNotFound(id.clone())),
            Recipient::Foreign(contact) => {
                // Inline recipients bypass the directory; the first contact
                // value doubles as the tracking key.
                let fallback_uid = contact
                    .email
                    .clone()
                    .or_else(|| contact.phone.clone())
                    .or_else(|| contact.whatsapp.clone())
                    .unwrap_or_default();

                Ok(ContactRecord {
                    uid: fallback_uid,
                    name: contact.name.clone(),
                    email: contact.email.clone(),
                    phone_number: contact.phone.clone(),
                    device_token: None,
                    whatsapp: contact.whatsapp.clone(),
                })
            }
        }
    }
}

fn build_channel_job(
    channel: Channel,
    event: &NotificationEvent,
    contact: &ContactRecord,
) -> Option<ChannelJob> {
    let payload = match channel {
        Channel::Email => {
            let content = event.channels.email.as_ref()?;
            NotificationPayload {
                to: contact.email.clone()?,
                title: Some(content.subject.clone()),
                body: content.body.clone(),
                data: None,
            }
        }
        Channel::Sms => {
            let content = event.channels.sms.as_ref()?;
            NotificationPayload {
                to: contact.phone_number.clone()?,
                title: None,
                body: content.body.clone(),
                data: None,
            }
        }
        Channel::Push => {
            let content = event.channels.push.as_ref()?;
            NotificationPayload {
                to: contact.device_token.clone()?,
                title: Some(content.title.clone()),
                body: content.body.clone(),
                data: Some(content.data.clone()),
            }
        }
        Channel::Whatsapp => {
            let content = event.channels.whatsapp.as_ref()?;
            let number = contact.whatsapp.clone()?;
            NotificationPayload {
                to: if number.starts_with("whatsapp:") {
                    number
                } else {
                    format!("whatsapp:{number}")
                },
                title: None,
                body: content.body.clone(),
                data: None,
            }
        }
    };

    Some(ChannelJob {
        payload,
        metadata: JobMetadata {
            message_id: event.metadata.message_id.clone(),
            user_id: contact.uid.clone(),
            priority: event.metadata.priority.unwrap_or(0),
            timestamp: now_millis(),
        },
    })
}

/// Consumer loop over the notification-event queue. Per-event failures are
/// contained: the loop logs, settles the delivery and moves on. Only
/// transient store/directory outages requeue the delivery.
pub async fn run_event_consumer(
    rbmq: Arc<RabbitMqClient>,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), anyhow::Error> {
    let mut consumer = rbmq.create_event_consumer().await?;

    info!("Dispatch consumer started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Broker delivery error");
                continue;
            }
        };

        let tag = delivery.delivery_tag;

        let event = match serde_json::from_slice::<NotificationEvent>(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable event payload");
                settle(&rbmq, tag, Settle::Drop).await;
                continue;
            }
        };

        let message_id = event.metadata.message_id.clone();

        match dispatcher.handle_event(event).await {
            Ok(DispatchOutcome::Dispatched { channels }) => {
                for dispatch in channels.iter().filter(|d| !d.success) {
                    publish_channel_failure(&rbmq, &message_id, dispatch).await;
                }
                settle(&rbmq, tag, Settle::Ack).await;
            }
            Ok(DispatchOutcome::Duplicate | DispatchOutcome::ClaimLost) => {
                settle(&rbmq, tag, Settle::Ack).await;
            }
            Err(e) if e.is_transient() => {
                warn!(message_id, error = %e, "Transient failure, requeueing event");
                settle(&rbmq, tag, Settle::Requeue).await;
            }
            Err(e) => {
                warn!(message_id, error = %e, "Event dropped");
                let dlq = DlqMessage {
                    message_id: message_id.clone(),
                    channel: None,
                    failure_reason: e.to_string(),
                    failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                };
                if let Err(publish_err) = rbmq.publish_to_dlq(&dlq).await {
                    error!(message_id, error = %publish_err, "Failed to dead-letter event");
                }
                settle(&rbmq, tag, Settle::Ack).await;
            }
        }
    }

    Ok(())
}

async fn publish_channel_failure(
    rbmq: &RabbitMqClient,
    message_id: &str,
    dispatch: &ChannelDispatch,
) {
    let dlq = DlqMessage {
        message_id: message_id.to_string(),
        channel: Some(dispatch.channel),
        failure_reason: dispatch
            .error
            .clone()
            .unwrap_or_else(|| "notification failed".to_string()),
        failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    if let Err(e) = rbmq.publish_to_dlq(&dlq).await {
        error!(
            message_id,
            channel = %dispatch.channel,
            error = %e,
            "Failed to dead-letter channel failure"
        );
    }
}

enum Settle {
    Ack,
    Drop,
    Requeue,
}

async fn settle(rbmq: &RabbitMqClient, tag: u64, settle: Settle) {
    let result = match settle {
        Settle::Ack => rbmq.acknowledge(tag).await,
        Settle::Drop => rbmq.reject(tag, false).await,
        Settle::Requeue => rbmq.reject(tag, true).await,
    };

    if let Err(e) = result {
        error!(delivery_tag = tag, error = %e, "Failed to settle delivery");
    }
}

/// Trivial consumer for user-directory change events: each payload is a
/// contact record to upsert.
pub async fn run_user_data_consumer(
    rbmq: Arc<RabbitMqClient>,
    directory: Arc<dyn UserDirectory>,
) -> Result<(), anyhow::Error> {
    let mut consumer = rbmq.create_user_data_consumer().await?;

    info!("User data consumer started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Broker delivery error");
                continue;
            }
        };

        let tag = delivery.delivery_tag;

        match serde_json::from_slice::<ContactRecord>(&delivery.data) {
            Ok(record) => match directory.upsert(record).await {
                Ok(()) => settle(&rbmq, tag, Settle::Ack).await,
                Err(e) => {
                    warn!(error = %e, "Directory upsert failed, requeueing");
                    settle(&rbmq, tag, Settle::Requeue).await;
                }
            },
            Err(e) => {
                warn!(error = %e, "Dropping unparseable user data payload");
                settle(&rbmq, tag, Settle::Drop).await;
            }
        }
    }

    Ok(())
}

/// Periodic cleanup sweep over the idempotency key space.
pub async fn run_cleanup_sweep(tracker: Arc<IdempotencyTracker>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = tracker.cleanup().await {
            warn!(error = %e, "Idempotency cleanup sweep failed");
        }
    }
}

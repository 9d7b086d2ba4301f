use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    models::{
        channel::Channel,
        record::{ChannelOutcome, ProcessingRecord, ProcessingStatus},
        retry::RetryConfig,
    },
    store::KeyValueStore,
    utils::{now_millis, retry_with_backoff},
};

const KEY_PREFIX: &str = "notification:";

/// Distributed idempotency tracker.
///
/// Maps a message id to its [`ProcessingRecord`] in the shared store. The
/// claim is a single atomic put-if-absent; channel updates go through a
/// bounded compare-and-swap loop so concurrent per-channel completions for
/// the same message never lose a write.
pub struct IdempotencyTracker {
    store: Arc<dyn KeyValueStore>,
    processing_window: Duration,
    cas_retry: RetryConfig,
}

impl IdempotencyTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, processing_window: Duration) -> Self {
        Self {
            store,
            processing_window,
            cas_retry: RetryConfig {
                max_attempts: 5,
                initial_delay_ms: 10,
                max_delay_ms: 100,
                backoff_multiplier: 2,
            },
        }
    }

    fn key(message_id: &str) -> String {
        format!("{KEY_PREFIX}{message_id}")
    }

    pub async fn is_processing(&self, message_id: &str) -> Result<bool, StoreError> {
        let record = self.processing_record(message_id).await?;
        Ok(matches!(
            record,
            Some(ProcessingRecord {
                status: ProcessingStatus::Processing,
                ..
            })
        ))
    }

    pub async fn has_been_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        let record = self.processing_record(message_id).await?;
        Ok(matches!(
            record,
            Some(ProcessingRecord {
                status: ProcessingStatus::Completed,
                ..
            })
        ))
    }

    pub async fn processing_record(
        &self,
        message_id: &str,
    ) -> Result<Option<ProcessingRecord>, StoreError> {
        let raw = self.store.get(&Self::key(message_id)).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Claims `message_id`, creating a record with every listed channel
    /// pending. Returns `false` when another worker already owns it; that is
    /// the normal dedup outcome, not an error.
    pub async fn start_processing(
        &self,
        message_id: &str,
        channels: &[Channel],
    ) -> Result<bool, StoreError> {
        let record = ProcessingRecord::new(channels, now_millis());
        let raw = serde_json::to_string(&record)?;

        let claimed = self
            .store
            .put_if_absent(&Self::key(message_id), &raw, self.processing_window)
            .await?;

        if claimed {
            debug!(message_id, ?channels, "Claimed message for processing");
        }

        Ok(claimed)
    }

    /// Records one channel's terminal outcome and recomputes the overall
    /// status. Read-modify-write under CAS; a conflicting concurrent update
    /// is retried with backoff up to a fixed bound.
    pub async fn update_channel_status(
        &self,
        message_id: &str,
        channel: Channel,
        outcome: ChannelOutcome,
    ) -> Result<(), StoreError> {
        let key = Self::key(message_id);

        retry_with_backoff(&self.cas_retry, || {
            let key = key.clone();
            let outcome = outcome.clone();

            async move {
                let Some(raw) = self.store.get(&key).await? else {
                    // Record already swept or expired; nothing to update.
                    warn!(message_id, %channel, "No processing record for channel update");
                    return Ok(());
                };

                let mut record: ProcessingRecord = serde_json::from_str(&raw)?;
                record.apply(channel, &outcome, now_millis());
                let updated = serde_json::to_string(&record)?;

                let swapped = self
                    .store
                    .compare_and_swap(&key, &raw, &updated, self.processing_window)
                    .await?;

                if swapped {
                    debug!(
                        message_id,
                        %channel,
                        overall = ?record.status,
                        "Channel status recorded"
                    );
                    Ok(())
                } else {
                    Err(StoreError::CasConflict(key.clone()))
                }
            }
        })
        .await
    }

    /// Sweeps records older than the processing window. Deleting a completed
    /// or stale record has no observable effect on in-flight processing, so
    /// this is safe to run concurrently with claims and updates.
    ///
    /// The full prefix scan is the correctness baseline; the store TTL on
    /// each record keeps unswept entries from outliving the window anyway.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        let keys = self.store.scan_keys(KEY_PREFIX).await?;
        let now = now_millis();
        let window_ms = self.processing_window.as_millis() as i64;
        let mut removed = 0;

        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };

            let record: ProcessingRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(key, error = %e, "Dropping unparseable processing record");
                    self.store.delete(&key).await?;
                    removed += 1;
                    continue;
                }
            };

            if record.is_expired(now, window_ms) {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Idempotency cleanup sweep finished");
        }

        Ok(removed)
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::channel::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Pending,
    Completed,
    Failed,
}

impl ChannelStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelStatus::Completed | ChannelStatus::Failed)
    }
}

/// Outcome reported back per channel once a job reaches a terminal state.
#[derive(Debug, Clone)]
pub enum ChannelOutcome {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub status: ChannelStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Idempotency record tracked per message id.
///
/// Created exactly once via an atomic put-if-absent carrying the processing
/// window as TTL. Overall status flips to `completed` only when every channel
/// entry is terminal; after that the record is immutable until expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    pub status: ProcessingStatus,

    /// Unix millis at claim time; drives expiry.
    pub started_at: i64,

    pub channels: HashMap<Channel, ChannelEntry>,
}

impl ProcessingRecord {
    pub fn new(channels: &[Channel], started_at: i64) -> Self {
        let channels = channels
            .iter()
            .map(|channel| {
                (
                    *channel,
                    ChannelEntry {
                        status: ChannelStatus::Pending,
                        error: None,
                        completed_at: None,
                    },
                )
            })
            .collect();

        Self {
            status: ProcessingStatus::Processing,
            started_at,
            channels,
        }
    }

    /// Applies one channel outcome and recomputes the overall status.
    pub fn apply(&mut self, channel: Channel, outcome: &ChannelOutcome, now: i64) {
        let entry = match outcome {
            ChannelOutcome::Completed => ChannelEntry {
                status: ChannelStatus::Completed,
                error: None,
                completed_at: Some(now),
            },
            ChannelOutcome::Failed(error) => ChannelEntry {
                status: ChannelStatus::Failed,
                error: Some(error.clone()),
                completed_at: None,
            },
        };

        self.channels.insert(channel, entry);

        if self.channels.values().all(|ch| ch.status.is_terminal()) {
            self.status = ProcessingStatus::Completed;
        }
    }

    pub fn is_expired(&self, now: i64, window_ms: i64) -> bool {
        now - self.started_at > window_ms
    }
}

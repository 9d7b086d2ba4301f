use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::channel::Channel;

/// Provider-facing send payload: a recipient address or token plus the
/// rendered content for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub message_id: String,

    /// Directory uid, or the contact value itself for foreign recipients.
    pub user_id: String,

    #[serde(default)]
    pub priority: i32,

    pub timestamp: i64,
}

/// Unit of work inside a channel queue. Created by the dispatcher, owned by
/// the queue until terminal, never shared across channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelJob {
    pub payload: NotificationPayload,
    pub metadata: JobMetadata,
}

/// Terminal result of a channel job, delivered through its [`JobHandle`].
///
/// [`JobHandle`]: crate::queue::JobHandle
#[derive(Debug, Clone)]
pub struct JobResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl JobResult {
    pub fn completed(message_id: Option<String>, attempts: u32) -> Self {
        Self {
            success: true,
            message_id,
            attempts,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            message_id: None,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// A permanently failed delivery, published to the dead-letter queue for
/// offline inspection and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    pub message_id: String,
    pub channel: Option<Channel>,
    pub failure_reason: String,
    pub failed_at: String,
}

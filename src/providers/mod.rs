pub mod fcm;
pub mod mailer;
pub mod twilio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::ProviderError, models::job::NotificationPayload};

pub use fcm::FcmProvider;
pub use mailer::MailerProvider;
pub use twilio::TwilioProvider;

/// Result of a provider send attempt. Expected failures (rejected recipient,
/// upstream 4xx/5xx, timeouts) come back as an unsuccessful outcome, never as
/// a panic; only programmer errors may escape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Capability implemented once per channel provider. The queue worker only
/// sees this interface; which service actually transmits the message is a
/// configuration concern.
#[async_trait]
pub trait SendProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup (credential warm-up, client construction). May fail,
    /// which aborts queue initialization for the channel.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Structural payload check. Fails fast before any network call and is
    /// never retried.
    fn validate_payload(&self, payload: &NotificationPayload) -> Result<(), ProviderError>;

    async fn send(&self, payload: &NotificationPayload) -> SendOutcome;
}

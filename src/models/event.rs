use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{error::DispatchError, models::channel::Channel};

/// The unit of work arriving from the event stream.
///
/// `messageId` is globally unique per logical send request; redelivery of the
/// same `messageId` must not produce duplicate sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub metadata: EventMetadata,

    #[serde(alias = "user")]
    pub recipient: Recipient,

    pub channels: ChannelSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub message_id: String,
    pub timestamp: i64,

    #[serde(default)]
    pub priority: Option<i32>,
}

/// Either a reference into the user directory or an inline contact. Exactly
/// one form is populated; a payload carrying an `id` is always treated as a
/// directory reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    Native { id: String },
    Foreign(InlineContact),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InlineContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
}

impl InlineContact {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.whatsapp.is_none()
    }
}

/// Per-channel content. At least one channel must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms: Option<SmsContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<WhatsappContent>,
}

impl ChannelSelection {
    /// Channels named in the event, in a fixed order.
    pub fn active(&self) -> Vec<Channel> {
        let mut channels = Vec::new();

        if self.email.is_some() {
            channels.push(Channel::Email);
        }
        if self.sms.is_some() {
            channels.push(Channel::Sms);
        }
        if self.push.is_some() {
            channels.push(Channel::Push);
        }
        if self.whatsapp.is_some() {
            channels.push(Channel::Whatsapp);
        }

        channels
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsContent {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushContent {
    pub title: String,
    pub body: String,

    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsappContent {
    pub body: String,
}

impl NotificationEvent {
    /// Structural validation: a message id, a deliverable recipient and at
    /// least one channel. Invalid events are dropped with no side effects.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.metadata.message_id.trim().is_empty() {
            return Err(DispatchError::Validation(
                "missing messageId in event metadata".to_string(),
            ));
        }

        match &self.recipient {
            Recipient::Native { id } if id.trim().is_empty() => {
                return Err(DispatchError::Validation(
                    "native recipient has empty id".to_string(),
                ));
            }
            Recipient::Foreign(contact) if contact.is_empty() => {
                return Err(DispatchError::Validation(
                    "foreign recipient has no contact fields".to_string(),
                ));
            }
            _ => {}
        }

        if self.channels.is_empty() {
            return Err(DispatchError::Validation(
                "event names no channels".to_string(),
            ));
        }

        Ok(())
    }
}

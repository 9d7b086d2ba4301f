use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// One notification medium. Each channel gets its own queue, provider and
/// content shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Email,
        Channel::Sms,
        Channel::Push,
        Channel::Whatsapp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::Whatsapp => "whatsapp",
        }
    }

    /// Queue name for this channel's job queue.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Channel::Email => "email-notifications",
            Channel::Sms => "sms-notifications",
            Channel::Push => "push-notifications",
            Channel::Whatsapp => "whatsapp-notifications",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    models::retry::RetryConfig,
    providers::{fcm::FcmConfig, mailer::MailerConfig, twilio::TwilioConfig},
};

fn default_prefetch() -> u16 {
    10
}

fn default_processing_window() -> u64 {
    24 * 60 * 60
}

fn default_cleanup_interval() -> u64 {
    60 * 60
}

fn default_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> u64 {
    2
}

/// Environment-driven configuration. Provider blocks are optional; a channel
/// whose provider is not configured simply gets no queue.
#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub amqp_url: String,
    pub event_queue_name: String,
    pub user_data_queue_name: String,
    pub failed_queue_name: String,

    #[serde(default = "default_prefetch")]
    pub prefetch_count: u16,

    pub redis_url: String,

    #[serde(default = "default_processing_window")]
    pub processing_window_seconds: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    pub database_url: String,

    #[serde(default = "default_concurrency")]
    pub queue_concurrency: usize,

    #[serde(default = "default_max_attempts")]
    pub max_send_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub retry_backoff_multiplier: u64,

    pub server_port: u16,

    // Push (FCM)
    #[serde(default)]
    pub fcm_project_id: Option<String>,

    // SMS + WhatsApp (Twilio)
    #[serde(default)]
    pub twilio_account_sid: Option<String>,

    #[serde(default)]
    pub twilio_auth_token: Option<String>,

    #[serde(default)]
    pub twilio_sms_from: Option<String>,

    #[serde(default)]
    pub twilio_whatsapp_from: Option<String>,

    // Email (HTTP mail relay)
    #[serde(default)]
    pub mailer_url: Option<String>,

    #[serde(default)]
    pub mailer_from: Option<String>,

    #[serde(default)]
    pub mailer_api_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_send_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn fcm_config(&self) -> Option<FcmConfig> {
        self.fcm_project_id
            .as_ref()
            .map(|project_id| FcmConfig {
                project_id: project_id.clone(),
            })
    }

    pub fn twilio_sms_config(&self) -> Option<TwilioConfig> {
        match (
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_sms_from,
        ) {
            (Some(sid), Some(token), Some(from)) => Some(TwilioConfig {
                account_sid: sid.clone(),
                auth_token: token.clone(),
                from: from.clone(),
                api_base: None,
            }),
            _ => None,
        }
    }

    pub fn twilio_whatsapp_config(&self) -> Option<TwilioConfig> {
        match (
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_whatsapp_from,
        ) {
            (Some(sid), Some(token), Some(from)) => Some(TwilioConfig {
                account_sid: sid.clone(),
                auth_token: token.clone(),
                from: from.clone(),
                api_base: None,
            }),
            _ => None,
        }
    }

    pub fn mailer_config(&self) -> Option<MailerConfig> {
        match (&self.mailer_url, &self.mailer_from) {
            (Some(endpoint), Some(from)) => Some(MailerConfig {
                endpoint: endpoint.clone(),
                from: from.clone(),
                api_token: self.mailer_api_token.clone(),
            }),
            _ => None,
        }
    }
}

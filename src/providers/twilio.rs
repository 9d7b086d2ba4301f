use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::ProviderError,
    models::job::NotificationPayload,
    providers::{SendOutcome, SendProvider},
};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// One provider instance per Twilio-backed channel; SMS and WhatsApp differ
/// only in the configured `from` number (`whatsapp:`-prefixed for WhatsApp).
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub api_base: Option<String>,
}

pub struct TwilioProvider {
    http_client: Client,
    name: String,
    config: TwilioConfig,
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: Option<String>,
    message: Option<String>,
}

impl TwilioProvider {
    pub fn new(name: impl Into<String>, config: TwilioConfig) -> Self {
        let name = name.into();
        info!(provider = %name, from = %config.from, "Twilio provider initialized");

        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            name,
            config,
        }
    }

    fn messages_url(&self) -> String {
        let base = self
            .config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE);

        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            base, self.config.account_sid
        )
    }
}

#[async_trait]
impl SendProvider for TwilioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            return Err(ProviderError::Init(
                "Twilio credentials are not configured".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_payload(&self, payload: &NotificationPayload) -> Result<(), ProviderError> {
        if payload.to.is_empty() {
            return Err(ProviderError::Validation(
                "recipient number cannot be empty".to_string(),
            ));
        }

        if payload.body.is_empty() {
            return Err(ProviderError::Validation(
                "message body cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    async fn send(&self, payload: &NotificationPayload) -> SendOutcome {
        debug!(provider = %self.name, to = %payload.to, "Sending Twilio message");

        let params = [
            ("To", payload.to.as_str()),
            ("From", self.config.from.as_str()),
            ("Body", payload.body.as_str()),
        ];

        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return SendOutcome::failure(e.to_string()),
        };

        let status = response.status();
        let body: TwilioMessageResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return SendOutcome::failure(format!("unreadable Twilio response: {e}")),
        };

        if status.is_success() {
            SendOutcome::sent(body.sid.unwrap_or_default())
        } else {
            SendOutcome::failure(
                body.message
                    .unwrap_or_else(|| format!("Twilio returned status {status}")),
            )
        }
    }
}

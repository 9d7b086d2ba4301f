use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::ProviderError,
    models::job::NotificationPayload,
    providers::{SendOutcome, SendProvider},
};

/// Email provider over an HTTP mail relay (the transactional-mail sidecar
/// owns SMTP; this service only speaks JSON to it).
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub endpoint: String,
    pub from: String,
    pub api_token: Option<String>,
}

pub struct MailerProvider {
    http_client: Client,
    config: MailerConfig,
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct MailResponse {
    #[serde(default)]
    message_id: Option<String>,

    #[serde(default)]
    error: Option<String>,
}

impl MailerProvider {
    pub fn new(config: MailerConfig) -> Self {
        info!(endpoint = %config.endpoint, "Mailer provider initialized");

        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

#[async_trait]
impl SendProvider for MailerProvider {
    fn name(&self) -> &str {
        "mailer"
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.config.endpoint.is_empty() {
            return Err(ProviderError::Init(
                "mail relay endpoint is not configured".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_payload(&self, payload: &NotificationPayload) -> Result<(), ProviderError> {
        if payload.to.is_empty() {
            return Err(ProviderError::Validation(
                "recipient address cannot be empty".to_string(),
            ));
        }

        if !payload.to.contains('@') {
            return Err(ProviderError::Validation(format!(
                "'{}' is not an email address",
                payload.to
            )));
        }

        if payload.title.as_deref().unwrap_or_default().is_empty() {
            return Err(ProviderError::Validation(
                "email subject cannot be empty".to_string(),
            ));
        }

        if payload.body.is_empty() {
            return Err(ProviderError::Validation(
                "email body cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    async fn send(&self, payload: &NotificationPayload) -> SendOutcome {
        debug!(to = %payload.to, "Sending email via mail relay");

        let request = MailRequest {
            from: &self.config.from,
            to: &payload.to,
            subject: payload.title.as_deref().unwrap_or_default(),
            html: &payload.body,
        };

        let mut builder = self.http_client.post(&self.config.endpoint).json(&request);

        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return SendOutcome::failure(e.to_string()),
        };

        let status = response.status();
        let body: MailResponse = response.json().await.unwrap_or(MailResponse {
            message_id: None,
            error: None,
        });

        if status.is_success() {
            SendOutcome::sent(body.message_id.unwrap_or_default())
        } else {
            SendOutcome::failure(
                body.error
                    .unwrap_or_else(|| format!("mail relay returned status {status}")),
            )
        }
    }
}

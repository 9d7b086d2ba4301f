use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::ProviderError,
    models::job::NotificationPayload,
    providers::{SendOutcome, SendProvider},
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub project_id: String,
}

/// Push provider over the FCM HTTP v1 API, authenticated via application
/// default credentials.
pub struct FcmProvider {
    http_client: Client,
    project_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
struct FcmMessage {
    token: String,
    notification: FcmNotification,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

impl FcmProvider {
    pub fn new(config: FcmConfig) -> Self {
        info!(project_id = %config.project_id, "FCM provider initialized");

        Self {
            http_client: Client::new(),
            project_id: config.project_id,
        }
    }

    async fn send_once(&self, payload: &NotificationPayload) -> Result<String, String> {
        let provider = gcp_auth::provider().await.map_err(|e| e.to_string())?;
        let token = provider.token(FCM_SCOPES).await.map_err(|e| e.to_string())?;

        let request = FcmRequest {
            message: FcmMessage {
                token: payload.to.clone(),
                notification: FcmNotification {
                    title: payload.title.clone().unwrap_or_default(),
                    body: payload.body.clone(),
                },
                data: payload.data.clone(),
            },
        };

        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            let body: FcmResponse = response.json().await.map_err(|e| e.to_string())?;
            Ok(body.name.unwrap_or_default())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(format!("FCM request failed: {error_text}"))
        }
    }
}

#[async_trait]
impl SendProvider for FcmProvider {
    fn name(&self) -> &str {
        "fcm"
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        // Warm up the credential chain so a misconfigured environment fails
        // at startup instead of on the first send.
        gcp_auth::provider()
            .await
            .map_err(|e| ProviderError::Init(e.to_string()))?;

        Ok(())
    }

    fn validate_payload(&self, payload: &NotificationPayload) -> Result<(), ProviderError> {
        validate_device_token(&payload.to)?;

        if payload.body.is_empty() {
            return Err(ProviderError::Validation(
                "push notification body cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    async fn send(&self, payload: &NotificationPayload) -> SendOutcome {
        debug!(device_token = %payload.to, "Sending FCM push notification");

        match self.send_once(payload).await {
            Ok(message_id) => SendOutcome::sent(message_id),
            Err(error) => SendOutcome::failure(error),
        }
    }
}

pub fn validate_device_token(token: &str) -> Result<(), ProviderError> {
    if token.is_empty() {
        return Err(ProviderError::Validation(
            "device token cannot be empty".to_string(),
        ));
    }

    if token.len() < 20 {
        return Err(ProviderError::Validation(
            "device token too short (minimum 20 characters)".to_string(),
        ));
    }

    if token.len() > 200 {
        return Err(ProviderError::Validation(
            "device token too long (maximum 200 characters)".to_string(),
        ));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(ProviderError::Validation(
            "device token contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

use std::collections::HashMap;

use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use tracing::debug;

use notification_common::message::{Channel, EnqueuedMessage};

use crate::channel::{metadata_str, push_token, ChannelAdapter};
use crate::config::Config;
use crate::models::fcm::{FcmNotification, FcmPayload, FcmResponse};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];
const DEFAULT_TITLE: &str = "Notification";

pub struct FcmClient {
    http_client: Client,
    url: String,
    provider: CustomServiceAccount,
}

impl FcmClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let project_id = config
            .firebase_project_id
            .as_deref()
            .ok_or_else(|| anyhow!("FIREBASE_PROJECT_ID is required for the push worker"))?;
        let client_email = config
            .firebase_client_email
            .as_deref()
            .ok_or_else(|| anyhow!("FIREBASE_CLIENT_EMAIL is required for the push worker"))?;
        let private_key = config
            .firebase_private_key
            .as_deref()
            .ok_or_else(|| anyhow!("FIREBASE_PRIVATE_KEY is required for the push worker"))?
            .replace("\\n", "\n");

        let service_account = serde_json::json!({
            "type": "service_account",
            "project_id": project_id,
            "private_key": private_key,
            "client_email": client_email,
            "token_uri": "https://oauth2.googleapis.com/token",
        });

        let provider = CustomServiceAccount::from_json(&service_account.to_string())
            .map_err(|e| anyhow!("Invalid Firebase service account: {}", e))?;

        let url = config.fcm_url.clone().unwrap_or_else(|| {
            format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                project_id
            )
        });

        Ok(Self {
            http_client: Client::new(),
            url,
            provider,
        })
    }

    pub async fn send(&self, payload: &FcmPayload) -> Result<(), Error> {
        let token = self
            .provider
            .token(FCM_SCOPES)
            .await
            .map_err(|e| anyhow!("Failed to obtain FCM token: {}", e))?;

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(token.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| anyhow!("FCM request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("FCM returned {}: {}", status, error_text));
        }

        let body: FcmResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse FCM response: {}", e))?;

        // The gateway reports per-device outcomes; any device error fails
        // the call with the first error message.
        if let Some(error) = body.results.iter().find_map(|r| r.error.as_deref()) {
            return Err(anyhow!("FCM device error: {}", error));
        }

        debug!(success = body.success, "FCM push accepted");

        Ok(())
    }
}

/// FCM-backed push channel.
pub struct PushAdapter {
    client: FcmClient,
}

impl PushAdapter {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Self {
            client: FcmClient::new(config)?,
        })
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn validate(&self, message: &EnqueuedMessage) -> Result<(), Error> {
        push_token(&message.request.metadata).map(|_| ())
    }

    async fn send(&self, message: &EnqueuedMessage, body: &str) -> Result<(), Error> {
        let metadata = &message.request.metadata;
        let token = push_token(metadata)?;

        let data = metadata.get("data").and_then(|v| v.as_object()).map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect::<HashMap<_, _>>()
        });

        let payload = FcmPayload {
            to: token.to_string(),
            notification: FcmNotification {
                title: metadata_str(metadata, "title")
                    .unwrap_or(DEFAULT_TITLE)
                    .to_string(),
                body: body.to_string(),
                image: metadata_str(metadata, "image_url").map(str::to_string),
            },
            data,
        };

        self.client.send(&payload).await
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notification_common::message::{Channel, NotificationRequest};
use notification_common::status::{NotificationStatus, StatusRecord};

use crate::error::ApiError;

/// Inbound notification submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub notification_type: Channel,
    pub user_id: String,
    pub template_code: String,
    pub variables: HashMap<String, serde_json::Value>,
    pub request_id: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NotificationPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.request_id.trim().is_empty() {
            return Err(ApiError::Validation("request_id must not be empty".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ApiError::Validation("user_id must not be empty".into()));
        }
        if self.template_code.trim().is_empty() {
            return Err(ApiError::Validation("template_code must not be empty".into()));
        }
        Ok(())
    }

    pub fn into_request(self) -> NotificationRequest {
        NotificationRequest {
            notification_type: self.notification_type,
            user_id: self.user_id,
            template_code: self.template_code,
            variables: self.variables,
            request_id: self.request_id,
            priority: self.priority,
            metadata: self.metadata,
        }
    }
}

/// Out-of-band user creation event, published to `user.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl UserPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(ApiError::Validation("email must be a valid address".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCreatedEvent {
    #[serde(flatten)]
    pub user: UserPayload,
    pub created_at: DateTime<Utc>,
}

/// External delivery-status callback, ingested per channel.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusCallbackPayload {
    pub notification_id: String,
    pub status: CallbackStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Callback status vocabulary; narrower than the worker lifecycle.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Delivered,
    Pending,
    Failed,
}

impl StatusCallbackPayload {
    pub fn into_record(self) -> StatusRecord {
        let (status, sent_at, failed_at) = match self.status {
            CallbackStatus::Delivered => (NotificationStatus::Delivered, self.timestamp, None),
            CallbackStatus::Pending => (NotificationStatus::Pending, None, None),
            CallbackStatus::Failed => (NotificationStatus::Failed, None, self.timestamp),
        };

        StatusRecord {
            notification_id: Some(self.notification_id),
            status,
            sent_at,
            error: self.error,
            failed_at,
        }
    }
}

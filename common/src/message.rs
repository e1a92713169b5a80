use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel. Doubles as the routing key on the direct exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }

    pub fn queue(&self) -> &'static str {
        match self {
            Channel::Email => "email.queue",
            Channel::Push => "push.queue",
        }
    }

    /// Worker-side idempotency key for a request on this channel.
    pub fn idempotency_key(&self, request_id: &str) -> String {
        format!("{}:idempotency:{}", self.as_str(), request_id)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Channel::Email),
            "push" => Some(Channel::Push),
            _ => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical inbound entity accepted at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
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

/// Bus payload: the request plus the fields the pipeline maintains across
/// republishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueuedMessage {
    #[serde(flatten)]
    pub request: NotificationRequest,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
}

impl EnqueuedMessage {
    pub fn new(request: NotificationRequest) -> Self {
        Self {
            request,
            created_at: Utc::now(),
            attempts: 0,
            notification_id: None,
        }
    }
}

/// Dead-letter payload published to the `failed` routing key once the retry
/// ladder is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    #[serde(flatten)]
    pub message: EnqueuedMessage,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueued_message_defaults_attempts_and_notification_id() {
        let raw = serde_json::json!({
            "notification_type": "email",
            "user_id": "u1",
            "template_code": "welcome_v1",
            "variables": {"name": "Ada"},
            "request_id": "r1",
            "created_at": "2025-01-01T00:00:00Z"
        });

        let message: EnqueuedMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(message.attempts, 0);
        assert_eq!(message.request.priority, 0);
        assert!(message.notification_id.is_none());
        assert_eq!(message.request.notification_type, Channel::Email);
    }

    #[test]
    fn failed_record_flattens_message_fields() {
        let mut message = EnqueuedMessage::new(NotificationRequest {
            notification_type: Channel::Push,
            user_id: "u1".into(),
            template_code: "welcome_v1".into(),
            variables: HashMap::new(),
            request_id: "r9".into(),
            priority: 3,
            metadata: HashMap::new(),
        });
        message.attempts = 5;
        message.notification_id = Some("n9".into());

        let record = FailedRecord {
            message,
            error: "push_token_missing".into(),
            failed_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["request_id"], "r9");
        assert_eq!(value["attempts"], 5);
        assert_eq!(value["notification_id"], "n9");
        assert_eq!(value["error"], "push_token_missing");
    }

    #[test]
    fn channel_keys_are_channel_qualified() {
        assert_eq!(Channel::Email.idempotency_key("r1"), "email:idempotency:r1");
        assert_eq!(Channel::Push.queue(), "push.queue");
        assert_eq!(Channel::parse("failed"), None);
    }
}

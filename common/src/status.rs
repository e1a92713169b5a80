use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Delivered | NotificationStatus::Failed)
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle view of a single request, as stored in the status store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn pending() -> Self {
        Self {
            notification_id: None,
            status: NotificationStatus::Pending,
            sent_at: None,
            error: None,
            failed_at: None,
        }
    }

    pub fn processing(notification_id: &str) -> Self {
        Self {
            notification_id: Some(notification_id.to_string()),
            status: NotificationStatus::Processing,
            sent_at: None,
            error: None,
            failed_at: None,
        }
    }

    pub fn delivered(notification_id: &str) -> Self {
        Self {
            notification_id: Some(notification_id.to_string()),
            status: NotificationStatus::Delivered,
            sent_at: Some(Utc::now()),
            error: None,
            failed_at: None,
        }
    }

    pub fn failed(notification_id: Option<String>, error: String) -> Self {
        Self {
            notification_id,
            status: NotificationStatus::Failed,
            sent_at: None,
            error: Some(error),
            failed_at: Some(Utc::now()),
        }
    }
}

/// Gateway admission key for first-level idempotency.
pub fn admission_key(request_id: &str) -> String {
    format!("idemp:{}", request_id)
}

/// Key for externally ingested status callbacks.
pub fn callback_key(notification_id: &str) -> String {
    format!("status:{}", notification_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(!NotificationStatus::Processing.is_terminal());
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
    }

    #[test]
    fn status_record_round_trips() {
        let record = StatusRecord::failed(Some("n1".into()), "smtp timeout".into());
        let json = serde_json::to_string(&record).unwrap();
        let back: StatusRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.status, NotificationStatus::Failed);
        assert_eq!(back.notification_id.as_deref(), Some("n1"));
        assert_eq!(back.error.as_deref(), Some("smtp timeout"));
        assert!(back.failed_at.is_some());
        assert!(back.sent_at.is_none());
    }

    #[test]
    fn pending_record_omits_empty_fields() {
        let json = serde_json::to_value(StatusRecord::pending()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "pending"}));
    }

    #[test]
    fn key_families() {
        assert_eq!(admission_key("r1"), "idemp:r1");
        assert_eq!(callback_key("n7"), "status:n7");
    }
}

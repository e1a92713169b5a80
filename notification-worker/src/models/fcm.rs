use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FcmPayload {
    pub to: String,
    pub notification: FcmNotification,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmResponse {
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
    #[serde(default)]
    pub results: Vec<FcmResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmResult {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_per_device_results() {
        let raw = r#"{"multicast_id":1,"success":0,"failure":1,
                      "results":[{"error":"NotRegistered"}]}"#;
        let response: FcmResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(response.failure, 1);
        assert_eq!(response.results[0].error.as_deref(), Some("NotRegistered"));
    }

    #[test]
    fn payload_omits_absent_fields() {
        let payload = FcmPayload {
            to: "token".into(),
            notification: FcmNotification {
                title: "t".into(),
                body: "b".into(),
                image: None,
            },
            data: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("data").is_none());
        assert!(value["notification"].get("image").is_none());
    }
}

use std::collections::HashMap;

use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;

use notification_common::message::{Channel, EnqueuedMessage};

/// Per-channel delivery backend. The pipeline validates the recipient before
/// rendering and routes the rendered body through the breaker-guarded `send`.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Recipient check for this channel. Failures are delivery errors and
    /// enter the retry ladder.
    fn validate(&self, message: &EnqueuedMessage) -> Result<(), Error>;

    async fn send(&self, message: &EnqueuedMessage, body: &str) -> Result<(), Error>;
}

pub fn metadata_str<'a>(
    metadata: &'a HashMap<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.as_str())
}

/// Email recipient lives in `metadata.email`.
pub fn email_recipient(metadata: &HashMap<String, serde_json::Value>) -> Result<&str, Error> {
    match metadata_str(metadata, "email") {
        Some(address) if !address.trim().is_empty() => Ok(address),
        _ => Err(anyhow!("email_recipient_missing")),
    }
}

/// Push recipient lives in `metadata.push_token`; anything shorter than 10
/// characters cannot be a device token.
pub fn push_token(metadata: &HashMap<String, serde_json::Value>) -> Result<&str, Error> {
    let token = metadata_str(metadata, "push_token").ok_or_else(|| anyhow!("push_token_missing"))?;

    if token.len() < 10 {
        return Err(anyhow!("push_token_invalid"));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn email_recipient_requires_non_empty_string() {
        let ok = metadata(&[("email", serde_json::json!("a@x"))]);
        assert_eq!(email_recipient(&ok).unwrap(), "a@x");

        let empty = metadata(&[("email", serde_json::json!("  "))]);
        assert!(email_recipient(&empty).is_err());

        let wrong_type = metadata(&[("email", serde_json::json!(42))]);
        assert!(email_recipient(&wrong_type)
            .unwrap_err()
            .to_string()
            .contains("email_recipient_missing"));

        assert!(email_recipient(&HashMap::new()).is_err());
    }

    #[test]
    fn push_token_length_is_enforced() {
        let ok = metadata(&[("push_token", serde_json::json!("abcdefghij"))]);
        assert_eq!(push_token(&ok).unwrap(), "abcdefghij");

        let short = metadata(&[("push_token", serde_json::json!("short"))]);
        assert!(push_token(&short)
            .unwrap_err()
            .to_string()
            .contains("push_token_invalid"));

        assert!(push_token(&HashMap::new())
            .unwrap_err()
            .to_string()
            .contains("push_token_missing"));
    }
}

use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use notification_common::message::{Channel, EnqueuedMessage};

use crate::channel::{email_recipient, metadata_str, ChannelAdapter};
use crate::config::Config;

const DEFAULT_SUBJECT: &str = "You have a new notification";

/// SMTP-backed email channel.
pub struct EmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailAdapter {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP_HOST is required for the email worker"))?;

        let from: Mailbox = config
            .email_from
            .as_deref()
            .ok_or_else(|| anyhow!("EMAIL_FROM is required for the email worker"))?
            .parse()
            .map_err(|e| anyhow!("EMAIL_FROM is not a valid mailbox: {}", e))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn validate(&self, message: &EnqueuedMessage) -> Result<(), Error> {
        email_recipient(&message.request.metadata).map(|_| ())
    }

    async fn send(&self, message: &EnqueuedMessage, body: &str) -> Result<(), Error> {
        let recipient = email_recipient(&message.request.metadata)?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| anyhow!("Invalid email recipient {}: {}", recipient, e))?;

        let subject =
            metadata_str(&message.request.metadata, "subject").unwrap_or(DEFAULT_SUBJECT);
        let text = strip_html(body);

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, body.to_string()))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("SMTP send failed: {}", e))?;

        debug!(recipient, "Email handed to SMTP relay");

        Ok(())
    }
}

/// Plain-text alternative for an HTML body. Tags are dropped, block
/// boundaries become single spaces.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                if !text.ends_with(' ') && !text.is_empty() {
                    text.push(' ');
                }
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.trim().to_string()
}

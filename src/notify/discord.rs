// src/notify/discord.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{MessageSink, NotifyError};

pub const DEFAULT_USERNAME: &str = "Pokemon TCG Bot";

/// Discord-compatible webhook transport: one POST per message.
#[derive(Clone)]
pub struct DiscordWebhook {
    webhook: String,
    username: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordWebhook {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            username: DEFAULT_USERNAME.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post_once(&self, payload: &WebhookPayload<'_>) -> Result<(), NotifyError> {
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSink for DiscordWebhook {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            content: text,
            username: &self.username,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => return Ok(()),
                // Client errors other than rate limiting will not improve on retry.
                Err(NotifyError::Status(code)) if (400..500).contains(&code) && code != 429 => {
                    return Err(NotifyError::Status(code))
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(target: "notify", error = %e, attempt, "webhook retry");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
}

//! Discord webhook notifications.

use async_trait::async_trait;
use chrono::Utc;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use serde_json::json;

use crate::{
    NotificationProvider, ensure_success, required_str, test_notification, transport_error,
    validate_url,
};

/// Embed sidebar color (Discord blurple).
const EMBED_COLOR: u32 = 0x5865f2;

/// Discord caps embed descriptions at 4096 characters.
const DESCRIPTION_LIMIT: usize = 4096;

pub struct DiscordProvider {
    client: reqwest::Client,
}

impl DiscordProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_payload(channel: &NotificationChannel, data: &NotificationData) -> serde_json::Value {
        let description: String = data.content.chars().take(DESCRIPTION_LIMIT).collect();
        let mut payload = json!({
            "embeds": [{
                "title": data.title,
                "description": description,
                "color": EMBED_COLOR,
                "timestamp": Utc::now().to_rfc3339(),
            }]
        });

        if let Some(username) = channel.config_str("username") {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = channel.config_str("avatar_url") {
            payload["avatar_url"] = json!(avatar_url);
        }
        payload
    }
}

#[async_trait]
impl NotificationProvider for DiscordProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Discord
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        let webhook_url = required_str(channel, "webhook_url")?;
        validate_url("webhook_url", webhook_url)?;

        let response = self
            .client
            .post(webhook_url)
            .json(&Self::build_payload(channel, data))
            .send()
            .await
            .map_err(|e| transport_error(ChannelType::Discord, e))?;

        ensure_success(ChannelType::Discord, response).await?;
        tracing::debug!(channel_id = channel.id, "Discord notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Discord, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

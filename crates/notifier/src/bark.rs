//! Bark push notifications (iOS).
//!
//! Config keys: `device_key` (required), `url` (server endpoint, defaults to the public
//! Bark server), and the optional push parameters `subtitle`, `level`, `volume`,
//! `badge`, `sound`, `group`, `icon`, `action` and `link` (forwarded as Bark's `url`).

use async_trait::async_trait;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use serde::{Deserialize, Serialize};

use crate::{
    NotificationProvider, ensure_success, required_str, test_notification, transport_error,
    validate_url,
};

pub const DEFAULT_BARK_URL: &str = "https://api.day.app/push";

const LEVELS: [&str; 4] = ["critical", "active", "timeSensitive", "passive"];
const MAX_VOLUME: i64 = 10;

/// Request body accepted by Bark's `/push` endpoint.
#[derive(Debug, Serialize)]
struct BarkRequest<'a> {
    title: &'a str,
    body: &'a str,
    device_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BarkResponse {
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct BarkProvider {
    client: reqwest::Client,
}

impl BarkProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request<'a>(
        channel: &'a NotificationChannel,
        data: &'a NotificationData,
    ) -> Result<BarkRequest<'a>, AppError> {
        let device_key = required_str(channel, "device_key")?;

        let level = channel.config_str("level");
        if let Some(level) = level
            && !LEVELS.contains(&level)
        {
            return Err(AppError::Validation(format!(
                "bark level must be one of {}: {}",
                LEVELS.join(", "),
                level
            )));
        }

        let volume = int_config(channel, "volume")?;
        if let Some(volume) = volume
            && !(0..=MAX_VOLUME).contains(&volume)
        {
            return Err(AppError::Validation(format!(
                "bark volume must be between 0 and {}: {}",
                MAX_VOLUME, volume
            )));
        }

        let icon = channel.config_str("icon");
        if let Some(icon) = icon {
            validate_url("icon", icon)?;
        }
        let link = channel.config_str("link");
        if let Some(link) = link {
            validate_url("link", link)?;
        }

        Ok(BarkRequest {
            title: &data.title,
            body: &data.content,
            device_key,
            subtitle: channel.config_str("subtitle"),
            level,
            volume,
            badge: int_config(channel, "badge")?,
            sound: channel.config_str("sound"),
            icon,
            group: channel.config_str("group"),
            url: link,
            action: channel.config_str("action"),
        })
    }
}

/// Read an integer config value given either as a JSON number or a numeric string.
fn int_config(channel: &NotificationChannel, key: &str) -> Result<Option<i64>, AppError> {
    match channel.config.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("bark {} must be an integer", key))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("bark {} must be an integer: {}", key, s))),
        Some(other) => Err(AppError::Validation(format!(
            "bark {} must be an integer: {}",
            key, other
        ))),
    }
}

#[async_trait]
impl NotificationProvider for BarkProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Bark
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        let request = Self::build_request(channel, data)?;
        let url = channel.config_str("url").unwrap_or(DEFAULT_BARK_URL);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(ChannelType::Bark, e))?;

        let body = ensure_success(ChannelType::Bark, response).await?;

        // Bark reports application errors in a 2xx JSON body.
        if let Ok(reply) = serde_json::from_str::<BarkResponse>(&body)
            && reply.code != 200
        {
            tracing::warn!(
                channel_id = channel.id,
                code = reply.code,
                message = %reply.message,
                "Bark rejected notification"
            );
            return Err(AppError::notification(
                ChannelType::Bark,
                format!("bark error {}: {}", reply.code, reply.message),
            ));
        }

        tracing::debug!(channel_id = channel.id, "Bark notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Bark, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

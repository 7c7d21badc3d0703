//! Feishu (Lark) custom bot notifications.
//!
//! When the bot has signature verification enabled, `secret` must be configured;
//! the request then carries `timestamp` and `sign`, where `sign` is
//! `base64(HMAC-SHA256(key = "<timestamp>\n<secret>", message = ""))`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::{
    NotificationProvider, ensure_success, required_str, test_notification, transport_error,
    validate_url,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct FeishuResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

pub struct FeishuProvider {
    client: reqwest::Client,
}

impl FeishuProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn sign(timestamp: i64, secret: &str) -> Result<String, AppError> {
    let key = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Internal(format!("failed to init feishu signer: {}", e)))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn build_payload(
    data: &NotificationData,
    secret: Option<&str>,
    timestamp: i64,
) -> Result<serde_json::Value, AppError> {
    let mut payload = json!({
        "msg_type": "text",
        "content": { "text": format!("{}\n{}", data.title, data.content) },
    });
    if let Some(secret) = secret {
        payload["timestamp"] = json!(timestamp.to_string());
        payload["sign"] = json!(sign(timestamp, secret)?);
    }
    Ok(payload)
}

#[async_trait]
impl NotificationProvider for FeishuProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Feishu
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        let webhook_url = required_str(channel, "webhook_url")?;
        validate_url("webhook_url", webhook_url)?;
        let payload = build_payload(data, channel.config_str("secret"), Utc::now().timestamp())?;

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(ChannelType::Feishu, e))?;

        let body = ensure_success(ChannelType::Feishu, response).await?;
        if let Ok(reply) = serde_json::from_str::<FeishuResponse>(&body)
            && reply.code != 0
        {
            return Err(AppError::notification(
                ChannelType::Feishu,
                format!("feishu error {}: {}", reply.code, reply.msg),
            ));
        }

        tracing::debug!(channel_id = channel.id, "Feishu notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Feishu, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

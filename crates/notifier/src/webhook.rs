//! Generic HTTP webhook.
//!
//! Sends `{title, content, timestamp}` as JSON to the configured `url` using `method`
//! (`POST` or `PUT`). Extra `headers` and a `bearer_token` may be supplied.

use async_trait::async_trait;
use chrono::Utc;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;

use crate::{
    NotificationProvider, ensure_success, required_str, test_notification, transport_error,
    validate_url,
};

pub struct WebhookProvider {
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn method(channel: &NotificationChannel) -> Result<Method, AppError> {
        match channel
            .config_str("method")
            .map(str::to_ascii_uppercase)
            .as_deref()
        {
            None | Some("POST") => Ok(Method::POST),
            Some("PUT") => Ok(Method::PUT),
            Some(other) => Err(AppError::Validation(format!(
                "webhook method must be POST or PUT: {}",
                other
            ))),
        }
    }

    fn headers(channel: &NotificationChannel) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();

        if let Some(map) = channel.config.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in map {
                let value = value.as_str().ok_or_else(|| {
                    AppError::Validation(format!("webhook header '{}' must be a string", name))
                })?;
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    AppError::Validation(format!("invalid webhook header name: {}", name))
                })?;
                let value = HeaderValue::from_str(value).map_err(|_| {
                    AppError::Validation(format!("invalid value for webhook header {}", name))
                })?;
                headers.insert(name, value);
            }
        }

        if let Some(token) = channel.config_str("bearer_token") {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AppError::Validation("invalid webhook bearer token".to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        let url = required_str(channel, "url")?;
        validate_url("url", url)?;
        let method = Self::method(channel)?;
        let headers = Self::headers(channel)?;

        let payload = json!({
            "title": data.title,
            "content": data.content,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(ChannelType::Webhook, e))?;

        ensure_success(ChannelType::Webhook, response).await?;
        tracing::debug!(channel_id = channel.id, "Webhook notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Webhook, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

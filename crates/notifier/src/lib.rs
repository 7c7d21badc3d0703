//! Notification delivery.
//!
//! Each [`NotificationProvider`] delivers a [`NotificationData`] payload through one
//! channel type, reading its settings from the channel's opaque JSON config:
//! - Bark push (`bark`)
//! - Generic HTTP webhook (`webhook`)
//! - Telegram Bot API (`telegram`)
//! - Discord webhook (`discord`)
//! - Feishu custom bot (`feishu`)
//! - Email via the Resend HTTP API (`email`)

pub mod bark;
pub mod discord;
pub mod email;
pub mod feishu;
pub mod telegram;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use onair_common::config::AppConfig;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};

/// Trait implemented by every notification channel type.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// The channel type this provider delivers for.
    fn channel_type(&self) -> ChannelType;

    /// Deliver one notification through the given channel.
    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError>;

    /// Validate a config by sending a fixed test message through it.
    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError>;
}

/// Payload sent by `test_connection`.
pub(crate) fn test_notification() -> NotificationData {
    NotificationData {
        title: "Test Notification".to_string(),
        content: "This is a test notification from OnAir".to_string(),
    }
}

/// Turn a non-2xx reply into a `Notification` error carrying the status and body.
pub(crate) async fn ensure_success(
    channel_type: ChannelType,
    response: reqwest::Response,
) -> Result<String, AppError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        return Ok(body);
    }

    let body = if body.is_empty() {
        "no response body".to_string()
    } else {
        body
    };
    tracing::warn!(
        channel_type = %channel_type,
        status = status.as_u16(),
        body = %body,
        "Notification endpoint returned error status"
    );
    Err(AppError::notification(
        channel_type,
        format!("endpoint returned status {}: {}", status.as_u16(), body),
    ))
}

pub(crate) fn transport_error(channel_type: ChannelType, err: reqwest::Error) -> AppError {
    AppError::notification(channel_type, format!("request failed: {}", err))
}

/// Require a non-blank string config key.
pub(crate) fn required_str<'a>(
    channel: &'a NotificationChannel,
    key: &str,
) -> Result<&'a str, AppError> {
    channel.config_str(key).ok_or_else(|| {
        AppError::Validation(format!(
            "{} channel config requires '{}'",
            channel.channel_type, key
        ))
    })
}

/// Require that a config value, when present, is an absolute http(s) URL.
pub(crate) fn validate_url(key: &str, value: &str) -> Result<(), AppError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppError::Validation(format!(
            "'{}' must be an absolute http(s) URL: {}",
            key, value
        ))),
    }
}

/// Lookup table of notification providers, built once at startup and read-only afterwards.
pub struct NotificationProviderRegistry {
    providers: HashMap<ChannelType, Arc<dyn NotificationProvider>>,
}

impl NotificationProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        let mut map = HashMap::with_capacity(providers.len());
        for provider in providers {
            let channel_type = provider.channel_type();
            tracing::info!(channel_type = %channel_type, "Registered notification provider");
            map.insert(channel_type, provider);
        }
        Self { providers: map }
    }

    /// Registry with all six built-in providers sharing one HTTP client.
    pub fn with_defaults(client: reqwest::Client, config: &AppConfig) -> Self {
        Self::new(vec![
            Arc::new(bark::BarkProvider::new(client.clone())),
            Arc::new(webhook::WebhookProvider::new(client.clone())),
            Arc::new(telegram::TelegramProvider::new(
                client.clone(),
                config.telegram_bot_token.clone(),
            )),
            Arc::new(discord::DiscordProvider::new(client.clone())),
            Arc::new(feishu::FeishuProvider::new(client.clone())),
            Arc::new(email::EmailProvider::new(
                client,
                config.resend_api_key.clone(),
                config.email_from.clone(),
            )),
        ])
    }

    pub fn get_provider(
        &self,
        channel_type: ChannelType,
    ) -> Result<Arc<dyn NotificationProvider>, AppError> {
        self.providers.get(&channel_type).cloned().ok_or_else(|| {
            AppError::ProviderNotFound(format!(
                "no provider for notification channel type: {}",
                channel_type
            ))
        })
    }

    pub fn all_providers(&self) -> Vec<Arc<dyn NotificationProvider>> {
        self.providers.values().cloned().collect()
    }

    pub fn has_provider(&self, channel_type: ChannelType) -> bool {
        self.providers.contains_key(&channel_type)
    }

    /// Supported channel types, sorted for stable output.
    pub fn supported_channels(&self) -> Vec<ChannelType> {
        let mut channels: Vec<ChannelType> = self.providers.keys().copied().collect();
        channels.sort();
        channels
    }
}

//! Email notifications sent through the Resend HTTP API.

use async_trait::async_trait;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use serde::Serialize;

use crate::{NotificationProvider, ensure_success, required_str, test_notification, transport_error};

const DEFAULT_RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: &'a str,
    html: String,
}

pub struct EmailProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: Option<String>,
}

impl EmailProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>, from: Option<String>) -> Self {
        Self::with_api_url(client, api_key, from, DEFAULT_RESEND_URL)
    }

    pub fn with_api_url(
        client: reqwest::Client,
        api_key: Option<String>,
        from: Option<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from: from.filter(|f| !f.trim().is_empty()),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), AppError> {
        match (self.api_key.as_deref(), self.from.as_deref()) {
            (Some(key), Some(from)) => Ok((key, from)),
            _ => Err(AppError::Config(
                "email delivery requires RESEND_API_KEY and EMAIL_FROM".to_string(),
            )),
        }
    }
}

fn validate_address(address: &str) -> Result<(), AppError> {
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid email address: {}", address)))
    }
}

fn render_html(data: &NotificationData) -> String {
    let escape = |s: &str| {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    };
    let body = escape(&data.content).replace('\n', "<br>");
    format!("<h2>{}</h2><p>{}</p>", escape(&data.title), body)
}

#[async_trait]
impl NotificationProvider for EmailProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        let to = required_str(channel, "to")?;
        validate_address(to)?;
        let (api_key, from) = self.credentials()?;

        let subject = match channel.config_str("subject_prefix") {
            Some(prefix) => format!("{} {}", prefix, data.title),
            None => data.title.clone(),
        };
        let email = ResendEmail {
            from,
            to: [to],
            subject,
            text: &data.content,
            html: render_html(data),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&email)
            .send()
            .await
            .map_err(|e| transport_error(ChannelType::Email, e))?;

        ensure_success(ChannelType::Email, response).await?;
        tracing::debug!(channel_id = channel.id, "Email notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Email, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

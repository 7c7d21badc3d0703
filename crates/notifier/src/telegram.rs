//! Telegram Bot API notifications (`sendMessage`).

use async_trait::async_trait;
use onair_common::error::AppError;
use onair_common::types::{ChannelType, NotificationChannel, NotificationData};
use serde::Deserialize;
use serde_json::json;

use crate::{NotificationProvider, ensure_success, required_str, test_notification};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this many characters.
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const DEFAULT_PARSE_MODE: &str = "HTML";

/// Titles longer than this are cut before the body gets its share of the limit.
const TITLE_LIMIT: usize = 256;

const TRUNCATED_SUFFIX: &str = "\n\n[truncated]";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: String,
}

pub struct TelegramProvider {
    client: reqwest::Client,
    api_base: String,
    /// Used for channels that do not configure their own `bot_token`.
    default_bot_token: Option<String>,
}

impl TelegramProvider {
    pub fn new(client: reqwest::Client, default_bot_token: Option<String>) -> Self {
        Self::with_api_base(client, default_bot_token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        client: reqwest::Client,
        default_bot_token: Option<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            default_bot_token: default_bot_token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn bot_token<'a>(&'a self, channel: &'a NotificationChannel) -> Result<&'a str, AppError> {
        channel
            .config_str("bot_token")
            .or(self.default_bot_token.as_deref())
            .ok_or_else(|| {
                AppError::Validation(
                    "telegram channel config requires 'bot_token' and no default token is set"
                        .to_string(),
                )
            })
    }
}

fn build_message(data: &NotificationData, parse_mode: &str) -> String {
    let html = parse_mode.eq_ignore_ascii_case("HTML");
    let (title, _) = render_within(&data.title, TITLE_LIMIT, html);
    let head = if html {
        format!("<b>{title}</b>\n\n")
    } else {
        format!("{title}\n\n")
    };
    let head_len = head.chars().count();

    let (body, cut) = render_within(&data.content, TELEGRAM_MESSAGE_LIMIT - head_len, html);
    if !cut {
        return head + &body;
    }
    let budget = TELEGRAM_MESSAGE_LIMIT - head_len - TRUNCATED_SUFFIX.chars().count();
    let (body, _) = render_within(&data.content, budget, html);
    format!("{head}{body}{TRUNCATED_SUFFIX}")
}

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

/// Render `text` (HTML-escaped when `html`) into at most `limit` characters.
///
/// Cuts only between source characters, so an entity is never split. The flag
/// reports whether anything was dropped.
fn render_within(text: &str, limit: usize, html: bool) -> (String, bool) {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        match escape_char(c).filter(|_| html) {
            Some(entity) => {
                if used + entity.len() > limit {
                    return (out, true);
                }
                out.push_str(entity);
                used += entity.len();
            }
            None => {
                if used + 1 > limit {
                    return (out, true);
                }
                out.push(c);
                used += 1;
            }
        }
    }
    (out, false)
}

#[async_trait]
impl NotificationProvider for TelegramProvider {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        data: &NotificationData,
    ) -> Result<(), AppError> {
        // Numeric chat ids are accepted as JSON numbers too.
        let chat_id = match channel.config.get("chat_id") {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => required_str(channel, "chat_id")?.to_string(),
        };
        let token = self.bot_token(channel)?;
        let parse_mode = channel.config_str("parse_mode").unwrap_or(DEFAULT_PARSE_MODE);

        let payload = json!({
            "chat_id": chat_id,
            "text": build_message(data, parse_mode),
            "parse_mode": parse_mode,
            "disable_web_page_preview": false,
        });

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors embed the URL, which carries the bot token.
                AppError::notification(
                    ChannelType::Telegram,
                    format!("request failed: {}", e.without_url()),
                )
            })?;

        let body = ensure_success(ChannelType::Telegram, response).await?;
        let reply: TelegramResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::notification(ChannelType::Telegram, format!("invalid response: {}", e))
        })?;
        if !reply.ok {
            return Err(AppError::notification(
                ChannelType::Telegram,
                format!("telegram API error: {}", reply.description),
            ));
        }

        tracing::debug!(channel_id = channel.id, "Telegram notification sent");
        Ok(())
    }

    async fn test_connection(&self, config: &serde_json::Value) -> Result<(), AppError> {
        let channel = NotificationChannel::transient(ChannelType::Telegram, config.clone());
        self.send(&channel, &test_notification()).await
    }
}

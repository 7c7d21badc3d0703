//! Douyu adapter built on the `betard/<room>` room endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onair_common::error::AppError;
use onair_common::types::{LiveStatus, PlatformType, StreamerInfo};
use serde::Deserialize;

use crate::StreamingPlatformProvider;

const DEFAULT_BASE_URL: &str = "https://www.douyu.com";

/// Title of the HTML page Douyu serves instead of JSON for closed or unknown rooms.
const PROMPT_PAGE_TITLE: &str = "<title>提示信息 -斗鱼</title>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BetardResponse {
    room: BetardRoom,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BetardRoom {
    nickname: String,
    show_status: i32,
    show_details: String,
    room_name: String,
    #[serde(rename = "coverSrc")]
    cover_src: String,
    /// Unix seconds
    show_time: i64,
    avatar: Avatar,
    second_lvl_name: String,
    room_biz_all: RoomBiz,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Avatar {
    big: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoomBiz {
    hot: String,
}

/// Douyu streaming platform adapter.
pub struct DouyuProvider {
    client: reqwest::Client,
    base_url: String,
}

impl DouyuProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_betard(&self, room_id: &str) -> Result<BetardRoom, AppError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(AppError::Validation("douyu room id is empty".to_string()));
        }

        let url = format!("{}/betard/{}", self.base_url, room_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::platform(PlatformType::Douyu, format!("failed to fetch betard: {}", e)))?;

        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        let body = response
            .text()
            .await
            .map_err(|e| AppError::platform(PlatformType::Douyu, format!("failed to read betard: {}", e)))?;

        if is_html && body.contains(PROMPT_PAGE_TITLE) {
            let message = extract_prompt_message(&body)
                .unwrap_or_else(|| "douyu returned prompt page".to_string());
            tracing::warn!(room_id, message = %message, "Douyu betard returned prompt page");
            return Err(AppError::platform(PlatformType::Douyu, message));
        }

        if !status.is_success() {
            return Err(AppError::platform(
                PlatformType::Douyu,
                format!("API returned error status: {}", status.as_u16()),
            ));
        }

        let parsed: BetardResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::platform(PlatformType::Douyu, format!("invalid betard response: {}", e))
        })?;
        Ok(parsed.room)
    }
}

/// Pull the human-readable reason out of the prompt page (`.error > span > p`).
fn extract_prompt_message(body: &str) -> Option<String> {
    let error_block = &body[body.find("class=\"error\"")?..];
    let p_open = error_block.find("<p")?;
    let after_tag = &error_block[p_open..];
    let text_start = after_tag.find('>')? + 1;
    let text = &after_tag[text_start..];
    let text_end = text.find("</p>")?;
    let message = text[..text_end].trim();
    (!message.is_empty()).then(|| message.to_string())
}

fn parse_show_time(show_time: i64) -> Option<DateTime<Utc>> {
    if show_time <= 0 {
        return None;
    }
    DateTime::from_timestamp(show_time, 0)
}

#[async_trait]
impl StreamingPlatformProvider for DouyuProvider {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Douyu
    }

    async fn fetch_streamer_info(
        &self,
        platform_streamer_id: &str,
    ) -> Result<StreamerInfo, AppError> {
        let room = self.fetch_betard(platform_streamer_id).await?;

        if room.nickname.trim().is_empty() {
            tracing::error!(room_id = %platform_streamer_id, "Douyu betard has no nickname");
            return Err(AppError::platform(
                PlatformType::Douyu,
                "failed to fetch streamer info",
            ));
        }

        let room_id = platform_streamer_id.trim();
        Ok(StreamerInfo {
            platform_streamer_id: room_id.to_string(),
            name: room.nickname,
            avatar: room.avatar.big,
            description: room.show_details,
            room_url: format!("https://www.douyu.com/{}", room_id),
        })
    }

    async fn check_live_status(&self, platform_streamer_id: &str) -> Result<LiveStatus, AppError> {
        let room = self.fetch_betard(platform_streamer_id).await?;

        let viewers = room.room_biz_all.hot.trim().parse::<i64>().unwrap_or_else(|_| {
            tracing::debug!(
                room_id = %platform_streamer_id,
                hot = %room.room_biz_all.hot,
                "Douyu hot value is not numeric"
            );
            0
        });

        let is_live = room.show_status == 1;
        Ok(LiveStatus {
            is_live,
            title: room.room_name,
            game_name: room.second_lvl_name,
            start_time: if is_live {
                parse_show_time(room.show_time)
            } else {
                None
            },
            viewers,
            cover_image: room.cover_src,
        })
    }
}

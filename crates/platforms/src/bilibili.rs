//! Bilibili Live adapter.
//!
//! Uses the public room endpoints:
//! - `GET /room/v1/Room/get_info?room_id=` for the live snapshot
//! - `GET /live_user/v1/Master/info?uid=` for the anchor's name and avatar

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use onair_common::error::AppError;
use onair_common::types::{LiveStatus, PlatformType, StreamerInfo};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::StreamingPlatformProvider;

const DEFAULT_BASE_URL: &str = "https://api.live.bilibili.com";

/// `live_time` value Bilibili returns for rooms that are not broadcasting.
const ZERO_LIVE_TIME: &str = "0000-00-00 00:00:00";

/// Bilibili reports times in China Standard Time (UTC+8).
const CST_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoomInfo {
    uid: i64,
    room_id: i64,
    title: String,
    description: String,
    /// 0: offline, 1: live, 2: replay loop
    live_status: i32,
    live_time: String,
    online: i64,
    user_cover: String,
    area_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MasterInfo {
    info: AnchorInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnchorInfo {
    uid: i64,
    uname: String,
    face: String,
}

/// Bilibili Live streaming platform adapter.
pub struct BilibiliProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BilibiliProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_room_id(platform_streamer_id: &str) -> Result<i64, AppError> {
        platform_streamer_id.trim().parse::<i64>().map_err(|_| {
            AppError::Validation(format!(
                "invalid bilibili room id: '{}'",
                platform_streamer_id
            ))
        })
    }

    async fn get_json<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::platform(PlatformType::Bilibili, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(url = %url, status = status.as_u16(), "Bilibili API returned error status");
            return Err(AppError::platform(
                PlatformType::Bilibili,
                format!("API returned error status: {}", status.as_u16()),
            ));
        }

        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            AppError::platform(PlatformType::Bilibili, format!("invalid response: {}", e))
        })?;

        if body.code != 0 {
            return Err(AppError::platform(
                PlatformType::Bilibili,
                format!("bilibili API error: {} (code: {})", body.message, body.code),
            ));
        }

        Ok(body.data.unwrap_or_default())
    }

    async fn room_info(&self, room_id: i64) -> Result<RoomInfo, AppError> {
        self.get_json("/room/v1/Room/get_info", &[("room_id", room_id.to_string())])
            .await
    }
}

/// Parse Bilibili's `live_time`, returning `None` for the offline sentinel.
fn parse_live_time(live_time: &str) -> Option<DateTime<Utc>> {
    let live_time = live_time.trim();
    if live_time.is_empty() || live_time == ZERO_LIVE_TIME {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(live_time, "%Y-%m-%d %H:%M:%S").ok()?;
    let offset = FixedOffset::east_opt(CST_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl StreamingPlatformProvider for BilibiliProvider {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Bilibili
    }

    async fn fetch_streamer_info(
        &self,
        platform_streamer_id: &str,
    ) -> Result<StreamerInfo, AppError> {
        let room_id = Self::parse_room_id(platform_streamer_id)?;
        let room = self.room_info(room_id).await?;

        let master: MasterInfo = self
            .get_json("/live_user/v1/Master/info", &[("uid", room.uid.to_string())])
            .await?;

        if master.info.uname.trim().is_empty() {
            tracing::error!(room_id, uid = master.info.uid, "Bilibili anchor has no name");
            return Err(AppError::platform(
                PlatformType::Bilibili,
                "failed to fetch streamer info",
            ));
        }

        Ok(StreamerInfo {
            platform_streamer_id: platform_streamer_id.trim().to_string(),
            name: master.info.uname,
            avatar: master.info.face,
            description: room.description,
            room_url: format!("https://live.bilibili.com/{}", room_id),
        })
    }

    async fn check_live_status(&self, platform_streamer_id: &str) -> Result<LiveStatus, AppError> {
        let room_id = Self::parse_room_id(platform_streamer_id)?;
        let room = self.room_info(room_id).await?;

        // Only status 1 counts as live; 2 is a replay loop.
        let is_live = room.live_status == 1;
        let start_time = if is_live {
            parse_live_time(&room.live_time)
        } else {
            None
        };

        tracing::debug!(room_id = room.room_id, is_live, "Checked Bilibili live status");

        Ok(LiveStatus {
            is_live,
            title: room.title,
            game_name: room.area_name,
            start_time,
            viewers: room.online,
            cover_image: room.user_cover,
        })
    }
}

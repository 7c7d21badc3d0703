use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Supported live-streaming platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    Douyu,
    Huya,
    Bilibili,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Douyu => "douyu",
            PlatformType::Huya => "huya",
            PlatformType::Bilibili => "bilibili",
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Webhook,
    Telegram,
    Discord,
    Feishu,
    Bark,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Webhook => "webhook",
            ChannelType::Telegram => "telegram",
            ChannelType::Discord => "discord",
            ChannelType::Feishu => "feishu",
            ChannelType::Bark => "bark",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live-status snapshot of a streamer, as last reported by its platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LiveStatus {
    pub is_live: bool,
    #[sqlx(rename = "live_title")]
    pub title: String,
    pub game_name: String,
    /// Start of the current live session, when the platform reports one.
    #[sqlx(rename = "live_start_time")]
    pub start_time: Option<DateTime<Utc>>,
    pub viewers: i64,
    pub cover_image: String,
}

impl LiveStatus {
    /// Session start time, ignoring the zero/epoch sentinel some platforms send.
    pub fn known_start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time.filter(|t| t.timestamp() > 0)
    }
}

/// Profile fields fetched from a streaming platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerInfo {
    pub platform_streamer_id: String,
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub room_url: String,
}

/// A content creator hosted on a streaming platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Streamer {
    pub id: i64,
    pub platform_type: PlatformType,
    pub platform_streamer_id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub room_url: String,
    pub bio: String,
    #[sqlx(flatten)]
    pub live_status: LiveStatus,
    pub last_live_synced_at: Option<DateTime<Utc>>,
    pub last_profile_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Streamer {
    /// Build an unsaved streamer from platform profile data.
    pub fn from_info(platform_type: PlatformType, info: &StreamerInfo) -> Result<Self, AppError> {
        let platform_streamer_id = info.platform_streamer_id.trim();
        if platform_streamer_id.is_empty() {
            return Err(AppError::Validation(
                "platform streamer id is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut streamer = Self {
            id: 0,
            platform_type,
            platform_streamer_id: platform_streamer_id.to_string(),
            display_name: String::new(),
            avatar_url: String::new(),
            room_url: String::new(),
            bio: String::new(),
            live_status: LiveStatus::default(),
            last_live_synced_at: None,
            last_profile_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        streamer.apply_info(info)?;
        Ok(streamer)
    }

    /// Merge freshly fetched profile data into this record.
    pub fn apply_info(&mut self, info: &StreamerInfo) -> Result<(), AppError> {
        let name = info.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "streamer display name is required".to_string(),
            ));
        }
        self.display_name = name.to_string();
        self.avatar_url = info.avatar.clone();
        self.bio = info.description.clone();
        if !info.room_url.is_empty() {
            self.room_url = info.room_url.clone();
        }
        Ok(())
    }

    /// Replace the live snapshot and stamp both sync timestamps.
    pub fn apply_live_status(&mut self, status: LiveStatus, synced_at: DateTime<Utc>) {
        self.live_status = status;
        self.last_live_synced_at = Some(synced_at);
        self.last_profile_synced_at = Some(synced_at);
        self.updated_at = synced_at;
    }

    pub fn is_live(&self) -> bool {
        self.live_status.is_live
    }
}

/// A user's follow of a streamer, with notification preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserFollowedStreamer {
    pub id: i64,
    pub user_id: i64,
    pub streamer_id: i64,
    pub alias: String,
    pub notes: String,
    pub notifications_enabled: bool,
    /// Explicit target channels. Empty means every enabled channel of the user.
    pub notification_channel_ids: Vec<i64>,
    pub last_notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserFollowedStreamer {
    /// Validate inputs and build a follow with notifications switched on.
    pub fn new(
        user_id: i64,
        streamer_id: i64,
        alias: &str,
        notes: &str,
        channel_ids: &[i64],
    ) -> Result<Self, AppError> {
        if user_id <= 0 {
            return Err(AppError::Validation(
                "user id must be greater than zero".to_string(),
            ));
        }
        if streamer_id <= 0 {
            return Err(AppError::Validation(
                "streamer id must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: 0,
            user_id,
            streamer_id,
            alias: alias.trim().to_string(),
            notes: notes.trim().to_string(),
            notifications_enabled: true,
            notification_channel_ids: normalize_channel_ids(channel_ids)?,
            last_notification_sent_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Name shown in reminders: the alias when set, otherwise the streamer's name.
    pub fn display_name<'a>(&'a self, streamer: &'a Streamer) -> &'a str {
        let alias = self.alias.trim();
        if alias.is_empty() {
            &streamer.display_name
        } else {
            alias
        }
    }
}

/// Reject non-positive ids and drop duplicates, keeping first-seen order.
pub fn normalize_channel_ids(channel_ids: &[i64]) -> Result<Vec<i64>, AppError> {
    let mut seen = HashSet::with_capacity(channel_ids.len());
    let mut result = Vec::with_capacity(channel_ids.len());
    for &id in channel_ids {
        if id <= 0 {
            return Err(AppError::Validation(
                "notification channel id must be greater than zero".to_string(),
            ));
        }
        if seen.insert(id) {
            result.push(id);
        }
    }
    Ok(result)
}

/// A user's configured notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationChannel {
    pub id: i64,
    pub user_id: i64,
    pub channel_type: ChannelType,
    pub name: String,
    /// Provider-specific settings, interpreted only by the channel type's provider.
    pub config: serde_json::Value,
    pub enabled: bool,
    /// Stored for display; delivery order does not depend on it.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationChannel {
    /// Unsaved channel carrying only a config, used for connection tests.
    pub fn transient(channel_type: ChannelType, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id: 0,
            channel_type,
            name: "test".to_string(),
            config,
            enabled: true,
            priority: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a string config value, treating blanks as absent.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Human-readable reminder payload, built per (follow, streamer) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub title: String,
    pub content: String,
}

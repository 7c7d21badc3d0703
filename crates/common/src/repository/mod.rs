//! Directory contracts for streamers, follows and notification channels.
//!
//! The reminder pipeline only talks to these traits; `Pg*Repository` types are
//! the PostgreSQL-backed implementations used by the scheduler binary.

mod channel;
mod follow;
mod streamer;

pub use channel::PgNotificationChannelRepository;
pub use follow::PgFollowRepository;
pub use streamer::PgStreamerRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::types::{NotificationChannel, PlatformType, Streamer, UserFollowedStreamer};

/// One page of rows plus the total row count reported by the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait StreamerRepository: Send + Sync {
    async fn create(&self, streamer: &Streamer) -> Result<Streamer, AppError>;

    async fn update(&self, streamer: &Streamer) -> Result<Streamer, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Streamer, AppError>;

    /// Returns `AppError::NotFound` when no streamer matches.
    async fn find_by_platform_streamer_id(
        &self,
        platform_type: PlatformType,
        platform_streamer_id: &str,
    ) -> Result<Streamer, AppError>;

    async fn list(&self, offset: u64, limit: u64) -> Result<Page<Streamer>, AppError>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait FollowRepository: Send + Sync {
    async fn list_by_streamer_id(
        &self,
        streamer_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<UserFollowedStreamer>, AppError>;

    async fn update(&self, follow: &UserFollowedStreamer) -> Result<UserFollowedStreamer, AppError>;

    /// Advance only `last_notification_sent_at`, leaving user-owned fields untouched.
    async fn mark_notified(
        &self,
        follow_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<UserFollowedStreamer, AppError>;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationChannelRepository: Send + Sync {
    /// Returns `AppError::NotFound` when the channel does not exist.
    async fn find_by_id(&self, id: i64) -> Result<NotificationChannel, AppError>;

    async fn list_by_user_id(
        &self,
        user_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<NotificationChannel>, AppError>;
}

/// Convert pagination arguments to the `BIGINT` values Postgres expects.
fn to_sql_window(offset: u64, limit: u64) -> (i64, i64) {
    (
        i64::try_from(offset).unwrap_or(i64::MAX),
        i64::try_from(limit).unwrap_or(i64::MAX),
    )
}

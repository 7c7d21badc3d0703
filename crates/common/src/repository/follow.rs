use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{FollowRepository, Page, to_sql_window};
use crate::error::AppError;
use crate::types::UserFollowedStreamer;

/// PostgreSQL-backed follow directory.
#[derive(Clone)]
pub struct PgFollowRepository {
    pool: PgPool,
}

impl PgFollowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowRepository for PgFollowRepository {
    async fn list_by_streamer_id(
        &self,
        streamer_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<UserFollowedStreamer>, AppError> {
        let (offset, limit) = to_sql_window(offset, limit);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_followed_streamers WHERE streamer_id = $1")
                .bind(streamer_id)
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<UserFollowedStreamer> = sqlx::query_as(
            r#"
            SELECT * FROM user_followed_streamers
            WHERE streamer_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(streamer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(rows, total.max(0) as u64))
    }

    async fn update(&self, follow: &UserFollowedStreamer) -> Result<UserFollowedStreamer, AppError> {
        let updated: Option<UserFollowedStreamer> = sqlx::query_as(
            r#"
            UPDATE user_followed_streamers
            SET alias = $1, notes = $2, notifications_enabled = $3,
                notification_channel_ids = $4, last_notification_sent_at = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&follow.alias)
        .bind(&follow.notes)
        .bind(follow.notifications_enabled)
        .bind(&follow.notification_channel_ids)
        .bind(follow.last_notification_sent_at)
        .bind(follow.id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| AppError::NotFound(format!("Follow {} not found", follow.id)))
    }

    async fn mark_notified(
        &self,
        follow_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<UserFollowedStreamer, AppError> {
        let updated: Option<UserFollowedStreamer> = sqlx::query_as(
            r#"
            UPDATE user_followed_streamers
            SET last_notification_sent_at = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(sent_at)
        .bind(follow_id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| AppError::NotFound(format!("Follow {} not found", follow_id)))
    }
}

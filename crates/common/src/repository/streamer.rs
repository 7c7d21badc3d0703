use async_trait::async_trait;
use sqlx::PgPool;

use super::{Page, StreamerRepository, to_sql_window};
use crate::error::AppError;
use crate::types::{PlatformType, Streamer};

/// PostgreSQL-backed streamer directory.
#[derive(Clone)]
pub struct PgStreamerRepository {
    pool: PgPool,
}

impl PgStreamerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamerRepository for PgStreamerRepository {
    async fn create(&self, streamer: &Streamer) -> Result<Streamer, AppError> {
        let created: Streamer = sqlx::query_as(
            r#"
            INSERT INTO streamers (
                platform_type, platform_streamer_id, display_name, avatar_url, room_url, bio,
                is_live, live_title, game_name, live_start_time, viewers, cover_image,
                last_live_synced_at, last_profile_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(streamer.platform_type.as_str())
        .bind(&streamer.platform_streamer_id)
        .bind(&streamer.display_name)
        .bind(&streamer.avatar_url)
        .bind(&streamer.room_url)
        .bind(&streamer.bio)
        .bind(streamer.live_status.is_live)
        .bind(&streamer.live_status.title)
        .bind(&streamer.live_status.game_name)
        .bind(streamer.live_status.start_time)
        .bind(streamer.live_status.viewers)
        .bind(&streamer.live_status.cover_image)
        .bind(streamer.last_live_synced_at)
        .bind(streamer.last_profile_synced_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            streamer_id = created.id,
            platform = %created.platform_type,
            platform_streamer_id = %created.platform_streamer_id,
            "Streamer created"
        );

        Ok(created)
    }

    async fn update(&self, streamer: &Streamer) -> Result<Streamer, AppError> {
        let updated: Option<Streamer> = sqlx::query_as(
            r#"
            UPDATE streamers
            SET display_name = $1, avatar_url = $2, room_url = $3, bio = $4,
                is_live = $5, live_title = $6, game_name = $7, live_start_time = $8,
                viewers = $9, cover_image = $10,
                last_live_synced_at = $11, last_profile_synced_at = $12,
                updated_at = NOW()
            WHERE id = $13
            RETURNING *
            "#,
        )
        .bind(&streamer.display_name)
        .bind(&streamer.avatar_url)
        .bind(&streamer.room_url)
        .bind(&streamer.bio)
        .bind(streamer.live_status.is_live)
        .bind(&streamer.live_status.title)
        .bind(&streamer.live_status.game_name)
        .bind(streamer.live_status.start_time)
        .bind(streamer.live_status.viewers)
        .bind(&streamer.live_status.cover_image)
        .bind(streamer.last_live_synced_at)
        .bind(streamer.last_profile_synced_at)
        .bind(streamer.id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| AppError::NotFound(format!("Streamer {} not found", streamer.id)))
    }

    async fn find_by_id(&self, id: i64) -> Result<Streamer, AppError> {
        sqlx::query_as("SELECT * FROM streamers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Streamer {} not found", id)))
    }

    async fn find_by_platform_streamer_id(
        &self,
        platform_type: PlatformType,
        platform_streamer_id: &str,
    ) -> Result<Streamer, AppError> {
        sqlx::query_as(
            "SELECT * FROM streamers WHERE platform_type = $1 AND platform_streamer_id = $2",
        )
        .bind(platform_type.as_str())
        .bind(platform_streamer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Streamer {}:{} not found",
                platform_type, platform_streamer_id
            ))
        })
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Page<Streamer>, AppError> {
        let (offset, limit) = to_sql_window(offset, limit);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM streamers")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<Streamer> =
            sqlx::query_as("SELECT * FROM streamers ORDER BY id LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        Ok(Page::new(rows, total.max(0) as u64))
    }
}

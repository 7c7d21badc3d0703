use async_trait::async_trait;
use sqlx::PgPool;

use super::{NotificationChannelRepository, Page, to_sql_window};
use crate::error::AppError;
use crate::types::NotificationChannel;

/// PostgreSQL-backed notification channel directory.
#[derive(Clone)]
pub struct PgNotificationChannelRepository {
    pool: PgPool,
}

impl PgNotificationChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationChannelRepository for PgNotificationChannelRepository {
    async fn find_by_id(&self, id: i64) -> Result<NotificationChannel, AppError> {
        sqlx::query_as("SELECT * FROM notification_channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification channel {} not found", id)))
    }

    async fn list_by_user_id(
        &self,
        user_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<NotificationChannel>, AppError> {
        let (offset, limit) = to_sql_window(offset, limit);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_channels WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<NotificationChannel> = sqlx::query_as(
            r#"
            SELECT * FROM notification_channels
            WHERE user_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(rows, total.max(0) as u64))
    }
}

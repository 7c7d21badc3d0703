//! Refresh-on-read access to the streamer directory.
//!
//! A refreshed read pulls the profile and live snapshot from the streamer's
//! platform, stamps both sync timestamps and persists the merged record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use onair_common::error::AppError;
use onair_common::repository::StreamerRepository;
use onair_common::types::{PlatformType, Streamer};
use onair_platforms::StreamingProviderRegistry;

/// Streamer lookup with optional refresh from the platform.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait StreamerRefresher: Send + Sync {
    /// Returns `Ok(None)` when the streamer is unknown and `refresh` is false.
    async fn find_by_platform_streamer_id(
        &self,
        platform_type: PlatformType,
        platform_streamer_id: &str,
        refresh: bool,
    ) -> Result<Option<Streamer>, AppError>;
}

pub struct StreamerService {
    repo: Arc<dyn StreamerRepository>,
    platforms: Arc<StreamingProviderRegistry>,
}

impl StreamerService {
    pub fn new(repo: Arc<dyn StreamerRepository>, platforms: Arc<StreamingProviderRegistry>) -> Self {
        Self { repo, platforms }
    }

    async fn refresh(
        &self,
        existing: Option<Streamer>,
        platform_type: PlatformType,
        platform_streamer_id: &str,
    ) -> Result<Streamer, AppError> {
        let provider = self.platforms.get_provider(platform_type)?;
        let info = provider.fetch_streamer_info(platform_streamer_id).await?;
        let status = provider.check_live_status(platform_streamer_id).await?;

        let mut streamer = match existing {
            Some(mut streamer) => {
                streamer.apply_info(&info)?;
                streamer
            }
            None => Streamer::from_info(platform_type, &info)?,
        };
        streamer.apply_live_status(status, Utc::now());

        if streamer.id > 0 {
            self.repo.update(&streamer).await
        } else {
            let created = self.repo.create(&streamer).await?;
            tracing::info!(
                streamer_id = created.id,
                platform = %platform_type,
                "Streamer discovered during refresh"
            );
            Ok(created)
        }
    }
}

#[async_trait]
impl StreamerRefresher for StreamerService {
    async fn find_by_platform_streamer_id(
        &self,
        platform_type: PlatformType,
        platform_streamer_id: &str,
        refresh: bool,
    ) -> Result<Option<Streamer>, AppError> {
        let existing = match self
            .repo
            .find_by_platform_streamer_id(platform_type, platform_streamer_id)
            .await
        {
            Ok(streamer) => Some(streamer),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if !refresh {
            return Ok(existing);
        }

        let refreshed = self
            .refresh(existing, platform_type, platform_streamer_id)
            .await?;
        tracing::debug!(
            streamer_id = refreshed.id,
            platform = %platform_type,
            is_live = refreshed.is_live(),
            "Streamer refreshed"
        );
        Ok(Some(refreshed))
    }
}

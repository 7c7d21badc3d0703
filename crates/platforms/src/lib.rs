pub mod bilibili;
pub mod douyu;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use onair_common::error::AppError;
use onair_common::types::PlatformType;

pub use onair_common::types::{LiveStatus, StreamerInfo};

/// Trait that every streaming platform adapter must implement.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait StreamingPlatformProvider: Send + Sync {
    /// The platform this adapter serves.
    fn platform_type(&self) -> PlatformType;

    /// Fetch profile fields (name, avatar, room URL) for a platform-native id.
    async fn fetch_streamer_info(&self, platform_streamer_id: &str)
    -> Result<StreamerInfo, AppError>;

    /// Fetch the current live snapshot for a platform-native id.
    async fn check_live_status(&self, platform_streamer_id: &str) -> Result<LiveStatus, AppError>;

    /// Check several streamers; failures are logged and left out of the result.
    async fn batch_check_live_status(
        &self,
        platform_streamer_ids: &[String],
    ) -> HashMap<String, LiveStatus> {
        let mut results = HashMap::with_capacity(platform_streamer_ids.len());
        for id in platform_streamer_ids {
            match self.check_live_status(id).await {
                Ok(status) => {
                    results.insert(id.clone(), status);
                }
                Err(e) => {
                    tracing::warn!(
                        platform = %self.platform_type(),
                        room_id = %id,
                        error = %e,
                        "Failed to check live status for room"
                    );
                }
            }
        }
        results
    }
}

/// Lookup table of platform adapters, built once at startup and read-only afterwards.
pub struct StreamingProviderRegistry {
    providers: HashMap<PlatformType, Arc<dyn StreamingPlatformProvider>>,
}

impl StreamingProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn StreamingPlatformProvider>>) -> Self {
        let mut map = HashMap::with_capacity(providers.len());
        for provider in providers {
            let platform = provider.platform_type();
            tracing::info!(platform = %platform, "Registered streaming platform provider");
            map.insert(platform, provider);
        }
        Self { providers: map }
    }

    /// Registry with every built-in adapter (Bilibili, Douyu) sharing one HTTP client.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        Self::new(vec![
            Arc::new(bilibili::BilibiliProvider::new(client.clone())),
            Arc::new(douyu::DouyuProvider::new(client)),
        ])
    }

    pub fn get_provider(
        &self,
        platform_type: PlatformType,
    ) -> Result<Arc<dyn StreamingPlatformProvider>, AppError> {
        self.providers.get(&platform_type).cloned().ok_or_else(|| {
            AppError::ProviderNotFound(format!("no provider for platform type: {}", platform_type))
        })
    }

    pub fn all_providers(&self) -> Vec<Arc<dyn StreamingPlatformProvider>> {
        self.providers.values().cloned().collect()
    }

    pub fn has_provider(&self, platform_type: PlatformType) -> bool {
        self.providers.contains_key(&platform_type)
    }

    /// Supported platforms, sorted for stable output.
    pub fn supported_platforms(&self) -> Vec<PlatformType> {
        let mut platforms: Vec<PlatformType> = self.providers.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

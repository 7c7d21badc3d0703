//! Per-sweep resolution of a follow's notification targets.
//!
//! A follow either names its channels explicitly or, with an empty list, targets
//! every enabled channel of its user. Lookups are cached for the lifetime of one
//! resolver so each channel id and each user is read from the directory at most once.

use std::collections::HashMap;

use onair_common::error::AppError;
use onair_common::repository::NotificationChannelRepository;
use onair_common::types::{NotificationChannel, UserFollowedStreamer};
use tokio_util::sync::CancellationToken;

pub const CHANNEL_PAGE_SIZE: u64 = 100;

pub struct ChannelResolver<'a> {
    repo: &'a dyn NotificationChannelRepository,
    /// `None` records a channel id the directory does not know.
    by_id: HashMap<i64, Option<NotificationChannel>>,
    /// Enabled channels per user.
    by_user: HashMap<i64, Vec<NotificationChannel>>,
}

impl<'a> ChannelResolver<'a> {
    pub fn new(repo: &'a dyn NotificationChannelRepository) -> Self {
        Self {
            repo,
            by_id: HashMap::new(),
            by_user: HashMap::new(),
        }
    }

    /// Enabled channels owned by the follow's user that should receive its reminder.
    pub async fn resolve(
        &mut self,
        follow: &UserFollowedStreamer,
        token: &CancellationToken,
    ) -> Result<Vec<NotificationChannel>, AppError> {
        if follow.notification_channel_ids.is_empty() {
            self.channels_by_user(follow.user_id, token).await
        } else {
            self.channels_by_ids(follow.user_id, &follow.notification_channel_ids, token)
                .await
        }
    }

    async fn channels_by_ids(
        &mut self,
        user_id: i64,
        ids: &[i64],
        token: &CancellationToken,
    ) -> Result<Vec<NotificationChannel>, AppError> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            if token.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let Some(channel) = self.channel_by_id(id).await? else {
                continue;
            };
            if channel.user_id != user_id {
                tracing::debug!(
                    channel_id = id,
                    user_id,
                    owner_id = channel.user_id,
                    "Skipping channel owned by another user"
                );
                continue;
            }
            if channel.enabled {
                results.push(channel);
            }
        }
        Ok(results)
    }

    async fn channel_by_id(&mut self, id: i64) -> Result<Option<NotificationChannel>, AppError> {
        if let Some(cached) = self.by_id.get(&id) {
            return Ok(cached.clone());
        }

        let channel = match self.repo.find_by_id(id).await {
            Ok(channel) => Some(channel),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.by_id.insert(id, channel.clone());
        Ok(channel)
    }

    async fn channels_by_user(
        &mut self,
        user_id: i64,
        token: &CancellationToken,
    ) -> Result<Vec<NotificationChannel>, AppError> {
        if let Some(cached) = self.by_user.get(&user_id) {
            return Ok(cached.clone());
        }

        let mut channels = Vec::new();
        let mut offset = 0u64;
        loop {
            if token.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let page = self
                .repo
                .list_by_user_id(user_id, offset, CHANNEL_PAGE_SIZE)
                .await?;
            if page.items.is_empty() {
                break;
            }

            offset += page.items.len() as u64;
            for channel in page.items {
                if channel.enabled {
                    channels.push(channel.clone());
                }
                self.by_id.insert(channel.id, Some(channel));
            }
            if offset >= page.total {
                break;
            }
        }

        self.by_user.insert(user_id, channels.clone());
        Ok(channels)
    }
}

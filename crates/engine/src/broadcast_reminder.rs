//! Broadcast reminder sweep.
//!
//! One run walks every streamer in the directory and, for each one that is live
//! after a refresh:
//! 1. Loads its followers that have notifications switched on
//! 2. Skips followers already reminded for the current live session
//! 3. Resolves each remaining follower's channels (per-run cache)
//! 4. Sends the reminder through every resolved channel's provider
//! 5. Stamps `last_notification_sent_at` when at least one send succeeded
//!
//! Failures for a single streamer, follower or channel are logged and skipped.
//! Cancellation aborts the run with `AppError::Cancelled`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use onair_common::config::BROADCAST_REMINDER_JOB;
use onair_common::error::AppError;
use onair_common::repository::{FollowRepository, NotificationChannelRepository, StreamerRepository};
use onair_common::types::{NotificationData, Streamer, UserFollowedStreamer};
use onair_notifier::NotificationProviderRegistry;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel_resolver::ChannelResolver;
use crate::job::Job;
use crate::streamer_service::StreamerRefresher;

pub const STREAMER_PAGE_SIZE: u64 = 50;
pub const FOLLOW_PAGE_SIZE: u64 = 100;

/// Counters reported at the end of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub streamers_scanned: u64,
    pub streamers_live: u64,
    /// Followers with at least one successful delivery.
    pub followers_notified: u64,
    pub deliveries_succeeded: u64,
    /// Failed sends, including channels whose type has no registered provider.
    pub deliveries_failed: u64,
}

/// Outcome of dispatching one follower's reminder.
#[derive(Debug, Default)]
struct Dispatch {
    succeeded: u64,
    failed: u64,
}

pub struct BroadcastReminder {
    streamer_repo: Arc<dyn StreamerRepository>,
    follow_repo: Arc<dyn FollowRepository>,
    channel_repo: Arc<dyn NotificationChannelRepository>,
    streamers: Arc<dyn StreamerRefresher>,
    notifiers: Arc<NotificationProviderRegistry>,
}

impl BroadcastReminder {
    pub fn new(
        streamer_repo: Arc<dyn StreamerRepository>,
        follow_repo: Arc<dyn FollowRepository>,
        channel_repo: Arc<dyn NotificationChannelRepository>,
        streamers: Arc<dyn StreamerRefresher>,
        notifiers: Arc<NotificationProviderRegistry>,
    ) -> Self {
        Self {
            streamer_repo,
            follow_repo,
            channel_repo,
            streamers,
            notifiers,
        }
    }

    /// Run one full pass over the streamer directory.
    pub async fn sweep(&self, token: &CancellationToken) -> Result<SweepSummary, AppError> {
        let mut resolver = ChannelResolver::new(self.channel_repo.as_ref());
        let mut summary = SweepSummary::default();

        let mut offset = 0u64;
        loop {
            ensure_active(token)?;

            let page = self.streamer_repo.list(offset, STREAMER_PAGE_SIZE).await?;
            if page.items.is_empty() {
                break;
            }
            offset += page.items.len() as u64;

            for streamer in &page.items {
                ensure_active(token)?;
                summary.streamers_scanned += 1;

                if let Err(e) = self
                    .process_streamer(streamer, &mut resolver, &mut summary, token)
                    .await
                {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    tracing::warn!(
                        streamer_id = streamer.id,
                        platform = %streamer.platform_type,
                        error = %e,
                        "Failed to process streamer for reminders"
                    );
                }
            }

            if offset >= page.total {
                break;
            }
        }

        Ok(summary)
    }

    async fn process_streamer(
        &self,
        streamer: &Streamer,
        resolver: &mut ChannelResolver<'_>,
        summary: &mut SweepSummary,
        token: &CancellationToken,
    ) -> Result<(), AppError> {
        let Some(streamer) = self
            .streamers
            .find_by_platform_streamer_id(
                streamer.platform_type,
                &streamer.platform_streamer_id,
                true,
            )
            .await?
        else {
            return Ok(());
        };
        if !streamer.is_live() {
            return Ok(());
        }
        summary.streamers_live += 1;

        let follows = self.list_followers(streamer.id, token).await?;
        tracing::debug!(
            streamer_id = streamer.id,
            followers = follows.len(),
            "Streamer is live"
        );

        for follow in follows {
            ensure_active(token)?;

            // Sends already made count even when the follower fails afterwards.
            let mut dispatch = Dispatch::default();
            let result = self
                .process_follower(&follow, &streamer, resolver, &mut dispatch, token)
                .await;
            summary.deliveries_succeeded += dispatch.succeeded;
            summary.deliveries_failed += dispatch.failed;
            if dispatch.succeeded > 0 {
                summary.followers_notified += 1;
            }

            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        follow_id = follow.id,
                        streamer_id = streamer.id,
                        error = %e,
                        "Failed to process follower notification"
                    );
                }
            }
        }
        Ok(())
    }

    /// All followers of a streamer with notifications switched on.
    async fn list_followers(
        &self,
        streamer_id: i64,
        token: &CancellationToken,
    ) -> Result<Vec<UserFollowedStreamer>, AppError> {
        let mut results = Vec::new();
        let mut offset = 0u64;
        loop {
            ensure_active(token)?;

            let page = self
                .follow_repo
                .list_by_streamer_id(streamer_id, offset, FOLLOW_PAGE_SIZE)
                .await?;
            if page.items.is_empty() {
                break;
            }
            offset += page.items.len() as u64;
            results.extend(page.items.into_iter().filter(|f| f.notifications_enabled));

            if offset >= page.total {
                break;
            }
        }
        Ok(results)
    }

    async fn process_follower(
        &self,
        follow: &UserFollowedStreamer,
        streamer: &Streamer,
        resolver: &mut ChannelResolver<'_>,
        dispatch: &mut Dispatch,
        token: &CancellationToken,
    ) -> Result<(), AppError> {
        if !should_send(follow, streamer) {
            return Ok(());
        }

        let channels = resolver.resolve(follow, token).await?;
        if channels.is_empty() {
            tracing::debug!(follow_id = follow.id, "No enabled channels for follower");
            return Ok(());
        }

        let data = build_notification_data(follow, streamer);
        for channel in channels.iter().filter(|c| c.enabled) {
            let provider = match self.notifiers.get_provider(channel.channel_type) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!(
                        channel_id = channel.id,
                        channel_type = %channel.channel_type,
                        error = %e,
                        "Notification provider unavailable"
                    );
                    dispatch.failed += 1;
                    continue;
                }
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(AppError::Cancelled),
                result = provider.send(channel, &data) => result,
            };
            match result {
                Ok(()) => dispatch.succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        channel_id = channel.id,
                        channel_type = %channel.channel_type,
                        follow_id = follow.id,
                        error = %e,
                        "Failed to send notification"
                    );
                    dispatch.failed += 1;
                }
            }
        }

        if dispatch.succeeded == 0 {
            return Ok(());
        }

        self.follow_repo.mark_notified(follow.id, Utc::now()).await?;
        tracing::info!(
            follow_id = follow.id,
            user_id = follow.user_id,
            streamer_id = streamer.id,
            delivered = dispatch.succeeded,
            "Broadcast reminder sent"
        );
        Ok(())
    }
}

fn ensure_active(token: &CancellationToken) -> Result<(), AppError> {
    if token.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// Whether a follower is due a reminder for the streamer's current live session.
///
/// The session is identified by its start time when the platform reports one,
/// otherwise by the last live-status sync. A reminder is due when that reference
/// is strictly later than the last reminder sent.
pub fn should_send(follow: &UserFollowedStreamer, streamer: &Streamer) -> bool {
    if !streamer.is_live() {
        return false;
    }
    let Some(last_sent) = follow.last_notification_sent_at else {
        return true;
    };
    match streamer
        .live_status
        .known_start_time()
        .or(streamer.last_live_synced_at)
    {
        Some(reference) => reference > last_sent,
        None => false,
    }
}

pub fn build_notification_data(follow: &UserFollowedStreamer, streamer: &Streamer) -> NotificationData {
    let title = format!("{} is live now!", follow.display_name(streamer));

    let mut content = streamer.live_status.title.trim().to_string();
    if !streamer.room_url.is_empty() {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&streamer.room_url);
    }
    if content.is_empty() {
        content = "Tune in now.".to_string();
    }

    NotificationData { title, content }
}

#[async_trait]
impl Job for BroadcastReminder {
    fn name(&self) -> &'static str {
        BROADCAST_REMINDER_JOB
    }

    async fn execute(&self, token: CancellationToken) -> Result<(), AppError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(run_id = %run_id, "Broadcast reminder sweep started");

        let summary = self.sweep(&token).await?;

        tracing::info!(
            run_id = %run_id,
            streamers_scanned = summary.streamers_scanned,
            streamers_live = summary.streamers_live,
            followers_notified = summary.followers_notified,
            deliveries_succeeded = summary.deliveries_succeeded,
            deliveries_failed = summary.deliveries_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Broadcast reminder sweep finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use mockall::predicate::eq;
    use onair_common::repository::{
        MockFollowRepository, MockNotificationChannelRepository, MockStreamerRepository, Page,
    };
    use onair_common::types::{ChannelType, LiveStatus, NotificationChannel, PlatformType};
    use onair_notifier::{MockNotificationProvider, NotificationProvider};

    use crate::streamer_service::MockStreamerRefresher;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_streamer(id: i64, is_live: bool, start_time: Option<DateTime<Utc>>) -> Streamer {
        Streamer {
            id,
            platform_type: PlatformType::Bilibili,
            platform_streamer_id: format!("room-{}", id),
            display_name: format!("Streamer {}", id),
            avatar_url: String::new(),
            room_url: format!("https://live.bilibili.com/{}", id),
            bio: String::new(),
            live_status: LiveStatus {
                is_live,
                title: "Speedrun".to_string(),
                start_time,
                ..Default::default()
            },
            last_live_synced_at: Some(ts(1_700_000_500)),
            last_profile_synced_at: Some(ts(1_700_000_500)),
            created_at: ts(1_600_000_000),
            updated_at: ts(1_700_000_500),
        }
    }

    fn make_follow(id: i64, user_id: i64, channel_ids: Vec<i64>) -> UserFollowedStreamer {
        UserFollowedStreamer {
            id,
            user_id,
            streamer_id: 1,
            alias: String::new(),
            notes: String::new(),
            notifications_enabled: true,
            notification_channel_ids: channel_ids,
            last_notification_sent_at: None,
            created_at: ts(1_600_000_000),
            updated_at: ts(1_600_000_000),
        }
    }

    fn notified(id: i64, at: DateTime<Utc>) -> UserFollowedStreamer {
        let mut follow = make_follow(id, 1, vec![]);
        follow.last_notification_sent_at = Some(at);
        follow
    }

    fn make_channel(id: i64, user_id: i64, channel_type: ChannelType, enabled: bool) -> NotificationChannel {
        let mut channel = NotificationChannel::transient(channel_type, serde_json::json!({}));
        channel.id = id;
        channel.user_id = user_id;
        channel.enabled = enabled;
        channel
    }

    fn one_page<T>(items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        Page::new(items, total)
    }

    fn streamer_repo_with(streamers: Vec<Streamer>) -> MockStreamerRepository {
        let mut repo = MockStreamerRepository::new();
        repo.expect_list()
            .returning(move |_, _| Ok(one_page(streamers.clone())));
        repo
    }

    fn refresher_returning(streamer: Streamer) -> MockStreamerRefresher {
        let mut refresher = MockStreamerRefresher::new();
        refresher
            .expect_find_by_platform_streamer_id()
            .withf(|_, _, refresh| *refresh)
            .returning(move |_, _, _| Ok(Some(streamer.clone())));
        refresher
    }

    fn provider(channel_type: ChannelType, calls: usize, ok: bool) -> Arc<dyn NotificationProvider> {
        let mut provider = MockNotificationProvider::new();
        provider.expect_channel_type().return_const(channel_type);
        provider.expect_send().times(calls).returning(move |_, _| {
            if ok {
                Ok(())
            } else {
                Err(AppError::notification(channel_type, "endpoint returned status 500"))
            }
        });
        Arc::new(provider)
    }

    fn reminder(
        streamers: MockStreamerRepository,
        follows: MockFollowRepository,
        channels: MockNotificationChannelRepository,
        refresher: MockStreamerRefresher,
        providers: Vec<Arc<dyn NotificationProvider>>,
    ) -> BroadcastReminder {
        BroadcastReminder::new(
            Arc::new(streamers),
            Arc::new(follows),
            Arc::new(channels),
            Arc::new(refresher),
            Arc::new(NotificationProviderRegistry::new(providers)),
        )
    }

    #[test]
    fn test_should_send_rules() {
        let live = make_streamer(1, true, Some(ts(1_700_000_000)));
        let mut follow = make_follow(1, 1, vec![]);

        assert!(should_send(&follow, &live));
        assert!(!should_send(&follow, &make_streamer(1, false, None)));

        follow.last_notification_sent_at = Some(ts(1_700_000_100));
        assert!(!should_send(&follow, &live));

        follow.last_notification_sent_at = Some(ts(1_699_999_000));
        assert!(should_send(&follow, &live));

        // Equal timestamps are not "after".
        follow.last_notification_sent_at = Some(ts(1_700_000_000));
        assert!(!should_send(&follow, &live));
    }

    #[test]
    fn test_should_send_falls_back_to_sync_time() {
        let mut streamer = make_streamer(1, true, None);
        let mut follow = make_follow(1, 1, vec![]);

        follow.last_notification_sent_at = Some(ts(1_700_000_400));
        assert!(should_send(&follow, &streamer));
        follow.last_notification_sent_at = Some(ts(1_700_000_500));
        assert!(!should_send(&follow, &streamer));

        // A zero start time counts as unknown.
        streamer.live_status.start_time = Some(ts(0));
        follow.last_notification_sent_at = Some(ts(1_700_000_400));
        assert!(should_send(&follow, &streamer));

        streamer.last_live_synced_at = None;
        assert!(!should_send(&follow, &streamer));
    }

    #[test]
    fn test_build_notification_data() {
        let mut streamer = make_streamer(3, true, None);
        let mut follow = make_follow(1, 1, vec![]);

        let data = build_notification_data(&follow, &streamer);
        assert_eq!(data.title, "Streamer 3 is live now!");
        assert_eq!(data.content, "Speedrun\nhttps://live.bilibili.com/3");

        follow.alias = "  Best Runner ".to_string();
        streamer.live_status.title.clear();
        let data = build_notification_data(&follow, &streamer);
        assert_eq!(data.title, "Best Runner is live now!");
        assert_eq!(data.content, "https://live.bilibili.com/3");

        streamer.room_url.clear();
        let data = build_notification_data(&follow, &streamer);
        assert_eq!(data.content, "Tune in now.");
    }

    #[tokio::test]
    async fn test_never_notified_follow_gets_one_send_per_channel() {
        let streamer = make_streamer(1, true, Some(ts(1_700_000_000)));

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .with(eq(1), eq(0), eq(FOLLOW_PAGE_SIZE))
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![])])));
        follows
            .expect_mark_notified()
            .withf(|id, _| *id == 10)
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().times(1).returning(|_, _, _| {
            Ok(one_page(vec![
                make_channel(100, 1, ChannelType::Bark, true),
                make_channel(101, 1, ChannelType::Email, true),
            ]))
        });

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![
                provider(ChannelType::Bark, 1, true),
                provider(ChannelType::Email, 1, true),
            ],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                streamers_scanned: 1,
                streamers_live: 1,
                followers_notified: 1,
                deliveries_succeeded: 2,
                deliveries_failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_already_notified_for_session_is_skipped() {
        let streamer = make_streamer(1, true, Some(ts(1_700_000_000)));

        let mut follows = MockFollowRepository::new();
        follows.expect_list_by_streamer_id().returning(|_, _, _| {
            let mut follow = make_follow(10, 1, vec![]);
            follow.last_notification_sent_at = Some(ts(1_700_000_060));
            Ok(one_page(vec![follow]))
        });
        follows.expect_mark_notified().never();

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().never();

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![provider(ChannelType::Bark, 0, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.followers_notified, 0);
    }

    #[tokio::test]
    async fn test_new_session_makes_follower_eligible_again() {
        // Notified during an earlier session; the new one started after that.
        let streamer = make_streamer(1, true, Some(ts(1_700_086_400)));

        let mut follows = MockFollowRepository::new();
        follows.expect_list_by_streamer_id().returning(|_, _, _| {
            let mut follow = make_follow(10, 1, vec![100]);
            follow.last_notification_sent_at = Some(ts(1_700_000_060));
            Ok(one_page(vec![follow]))
        });
        follows
            .expect_mark_notified()
            .withf(|_, at| *at > ts(1_700_086_400))
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let mut channels = MockNotificationChannelRepository::new();
        channels
            .expect_find_by_id()
            .with(eq(100))
            .returning(|_| Ok(make_channel(100, 1, ChannelType::Bark, true)));

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![provider(ChannelType::Bark, 1, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.followers_notified, 1);
    }

    #[tokio::test]
    async fn test_channel_of_other_user_is_not_used() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![7])])));
        follows.expect_mark_notified().never();

        let mut channels = MockNotificationChannelRepository::new();
        channels
            .expect_find_by_id()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(make_channel(7, 2, ChannelType::Bark, true)));

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![provider(ChannelType::Bark, 0, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deliveries_succeeded + summary.deliveries_failed, 0);
    }

    #[tokio::test]
    async fn test_fallback_to_enabled_channels_only() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![])])));
        follows
            .expect_mark_notified()
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().returning(|_, _, _| {
            Ok(one_page(vec![
                make_channel(1, 1, ChannelType::Bark, true),
                make_channel(2, 1, ChannelType::Telegram, false),
            ]))
        });

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![
                provider(ChannelType::Bark, 1, true),
                provider(ChannelType::Telegram, 0, true),
            ],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deliveries_succeeded, 1);
    }

    #[tokio::test]
    async fn test_provider_failure_does_not_block_second_channel() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![])])));
        follows
            .expect_mark_notified()
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().returning(|_, _, _| {
            Ok(one_page(vec![
                make_channel(1, 1, ChannelType::Webhook, true),
                make_channel(2, 1, ChannelType::Bark, true),
            ]))
        });

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![
                provider(ChannelType::Webhook, 1, false),
                provider(ChannelType::Bark, 1, true),
            ],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deliveries_failed, 1);
        assert_eq!(summary.deliveries_succeeded, 1);
        assert_eq!(summary.followers_notified, 1);
    }

    #[tokio::test]
    async fn test_all_sends_failing_skips_write_back() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![])])));
        follows.expect_mark_notified().never();

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().returning(|_, _, _| {
            Ok(one_page(vec![
                make_channel(1, 1, ChannelType::Webhook, true),
                // No provider registered for this type.
                make_channel(2, 1, ChannelType::Feishu, true),
            ]))
        });

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![provider(ChannelType::Webhook, 1, false)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deliveries_failed, 2);
        assert_eq!(summary.followers_notified, 0);
    }

    #[tokio::test]
    async fn test_single_page_when_total_reached() {
        let mut streamers = MockStreamerRepository::new();
        streamers
            .expect_list()
            .with(eq(0), eq(STREAMER_PAGE_SIZE))
            .times(1)
            .returning(|_, _| Ok(Page::new(vec![make_streamer(1, false, None)], 1)));

        let job = reminder(
            streamers,
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            refresher_returning(make_streamer(1, false, None)),
            Vec::new(),
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.streamers_scanned, 1);
        assert_eq!(summary.streamers_live, 0);
    }

    #[tokio::test]
    async fn test_paginates_until_total() {
        let mut streamers = MockStreamerRepository::new();
        streamers.expect_list().times(2).returning(|offset, _| {
            let items = if offset == 0 {
                (1..=50).map(|id| make_streamer(id, false, None)).collect()
            } else {
                vec![make_streamer(51, false, None)]
            };
            Ok(Page::new(items, 51))
        });

        let mut refresher = MockStreamerRefresher::new();
        refresher
            .expect_find_by_platform_streamer_id()
            .times(51)
            .returning(|_, _, _| Ok(None));

        let job = reminder(
            streamers,
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            refresher,
            Vec::new(),
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.streamers_scanned, 51);
    }

    #[tokio::test]
    async fn test_streamer_error_does_not_abort_sweep() {
        let mut refresher = MockStreamerRefresher::new();
        refresher
            .expect_find_by_platform_streamer_id()
            .returning(|_, id, _| {
                if id == "room-1" {
                    Err(AppError::platform("bilibili", "timeout"))
                } else {
                    Ok(Some(make_streamer(2, false, None)))
                }
            });

        let job = reminder(
            streamer_repo_with(vec![make_streamer(1, true, None), make_streamer(2, true, None)]),
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            refresher,
            Vec::new(),
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.streamers_scanned, 2);
    }

    #[tokio::test]
    async fn test_streamer_listing_error_ends_sweep() {
        let mut streamers = MockStreamerRepository::new();
        streamers
            .expect_list()
            .returning(|_, _| Err(AppError::Internal("db down".to_string())));

        let job = reminder(
            streamers,
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            MockStreamerRefresher::new(),
            Vec::new(),
        );

        let err = job.sweep(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_issues_no_reads() {
        let mut streamers = MockStreamerRepository::new();
        streamers.expect_list().never();
        let mut refresher = MockStreamerRefresher::new();
        refresher.expect_find_by_platform_streamer_id().never();

        let job = reminder(
            streamers,
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            refresher,
            Vec::new(),
        );

        let token = CancellationToken::new();
        token.cancel();
        let err = job.execute(token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_mid_sweep_propagates() {
        let token = CancellationToken::new();
        let trigger = token.clone();

        let mut refresher = MockStreamerRefresher::new();
        refresher
            .expect_find_by_platform_streamer_id()
            .times(1)
            .returning(move |_, _, _| {
                trigger.cancel();
                Ok(Some(make_streamer(1, true, None)))
            });

        let mut follows = MockFollowRepository::new();
        follows.expect_list_by_streamer_id().never();

        let job = reminder(
            streamer_repo_with(vec![make_streamer(1, true, None), make_streamer(2, true, None)]),
            follows,
            MockNotificationChannelRepository::new(),
            refresher,
            Vec::new(),
        );

        let err = job.sweep(&token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_disabled_follows_are_filtered() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows.expect_list_by_streamer_id().returning(|_, _, _| {
            let mut muted = make_follow(10, 1, vec![]);
            muted.notifications_enabled = false;
            Ok(one_page(vec![muted]))
        });
        follows.expect_mark_notified().never();

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().never();

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            Vec::new(),
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.streamers_live, 1);
        assert_eq!(summary.followers_notified, 0);
    }

    fn bark_channels_for_user() -> MockNotificationChannelRepository {
        let mut channels = MockNotificationChannelRepository::new();
        channels
            .expect_list_by_user_id()
            .returning(|_, _, _| Ok(one_page(vec![make_channel(100, 1, ChannelType::Bark, true)])));
        channels
    }

    #[tokio::test]
    async fn test_followers_paginate_past_first_page() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .withf(|id, offset, limit| *id == 1 && *offset == 0 && *limit == FOLLOW_PAGE_SIZE)
            .times(1)
            .returning(|_, _, _| {
                let items = (1..=100).map(|id| make_follow(id, 1, vec![])).collect();
                Ok(Page::new(items, 101))
            });
        follows
            .expect_list_by_streamer_id()
            .withf(|id, offset, limit| *id == 1 && *offset == 100 && *limit == FOLLOW_PAGE_SIZE)
            .times(1)
            .returning(|_, _, _| Ok(Page::new(vec![make_follow(101, 1, vec![])], 101)));
        follows
            .expect_mark_notified()
            .withf(|id, _| *id <= 100)
            .times(100)
            .returning(|id, at| Ok(notified(id, at)));
        follows
            .expect_mark_notified()
            .withf(|id, _| *id == 101)
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            bark_channels_for_user(),
            refresher_returning(streamer),
            vec![provider(ChannelType::Bark, 101, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.followers_notified, 101);
        assert_eq!(summary.deliveries_succeeded, 101);
    }

    #[tokio::test]
    async fn test_follower_write_back_error_does_not_stop_others() {
        let streamer = make_streamer(1, true, None);

        let mut follows = MockFollowRepository::new();
        follows.expect_list_by_streamer_id().returning(|_, _, _| {
            Ok(one_page(vec![make_follow(1, 1, vec![]), make_follow(2, 1, vec![])]))
        });
        follows
            .expect_mark_notified()
            .withf(|id, _| *id == 1)
            .times(1)
            .returning(|_, _| Err(AppError::Internal("db down".to_string())));
        follows
            .expect_mark_notified()
            .withf(|id, _| *id == 2)
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            bark_channels_for_user(),
            refresher_returning(streamer),
            vec![provider(ChannelType::Bark, 2, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        // The first follower was reached even though its timestamp was not stored.
        assert_eq!(summary.deliveries_succeeded, 2);
        assert_eq!(summary.deliveries_failed, 0);
        assert_eq!(summary.followers_notified, 2);
    }

    #[tokio::test]
    async fn test_follower_listing_error_does_not_stop_next_streamer() {
        let mut refresher = MockStreamerRefresher::new();
        refresher
            .expect_find_by_platform_streamer_id()
            .returning(|_, id, _| {
                let id = if id == "room-1" { 1 } else { 2 };
                Ok(Some(make_streamer(id, true, None)))
            });

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .withf(|id, _, _| *id == 1)
            .times(1)
            .returning(|_, _, _| Err(AppError::Internal("db down".to_string())));
        follows
            .expect_list_by_streamer_id()
            .withf(|id, _, _| *id == 2)
            .times(1)
            .returning(|_, _, _| Ok(one_page(vec![make_follow(20, 1, vec![])])));
        follows
            .expect_mark_notified()
            .withf(|id, _| *id == 20)
            .times(1)
            .returning(|id, at| Ok(notified(id, at)));

        let job = reminder(
            streamer_repo_with(vec![make_streamer(1, true, None), make_streamer(2, true, None)]),
            follows,
            bark_channels_for_user(),
            refresher,
            vec![provider(ChannelType::Bark, 1, true)],
        );

        let summary = job.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.streamers_live, 2);
        assert_eq!(summary.followers_notified, 1);
    }

    /// Cancels the run from inside `send` and never finishes the delivery.
    struct CancellingProvider {
        token: CancellationToken,
    }

    #[async_trait]
    impl NotificationProvider for CancellingProvider {
        fn channel_type(&self) -> ChannelType {
            ChannelType::Telegram
        }

        async fn send(&self, _: &NotificationChannel, _: &NotificationData) -> Result<(), AppError> {
            self.token.cancel();
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn test_connection(&self, _: &serde_json::Value) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_during_send_skips_write_back() {
        let streamer = make_streamer(1, true, None);
        let token = CancellationToken::new();

        let mut follows = MockFollowRepository::new();
        follows
            .expect_list_by_streamer_id()
            .returning(|_, _, _| Ok(one_page(vec![make_follow(10, 1, vec![])])));
        follows.expect_mark_notified().never();

        let mut channels = MockNotificationChannelRepository::new();
        channels.expect_list_by_user_id().returning(|_, _, _| {
            Ok(one_page(vec![
                make_channel(1, 1, ChannelType::Telegram, true),
                make_channel(2, 1, ChannelType::Webhook, true),
            ]))
        });

        let job = reminder(
            streamer_repo_with(vec![streamer.clone()]),
            follows,
            channels,
            refresher_returning(streamer),
            vec![
                Arc::new(CancellingProvider { token: token.clone() }) as Arc<dyn NotificationProvider>,
                provider(ChannelType::Webhook, 0, true),
            ],
        );

        let err = job.sweep(&token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_job_name() {
        let job = reminder(
            MockStreamerRepository::new(),
            MockFollowRepository::new(),
            MockNotificationChannelRepository::new(),
            MockStreamerRefresher::new(),
            Vec::new(),
        );
        assert_eq!(job.name(), "broadcast_reminder");
    }
}

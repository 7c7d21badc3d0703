use std::sync::Arc;
use std::time::Duration;

use onair_common::config::AppConfig;
use onair_common::db;
use onair_common::repository::{
    PgFollowRepository, PgNotificationChannelRepository, PgStreamerRepository,
};
use onair_engine::{BroadcastReminder, Job, StreamerService};
use onair_notifier::NotificationProviderRegistry;
use onair_platforms::StreamingProviderRegistry;
use onair_scheduler::{CronScheduler, JobRegistry, RedisJobLock};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "onair_scheduler=info,onair_engine=info,onair_notifier=info,onair_platforms=info";

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("pretty") {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_format);

    tracing::info!("OnAir scheduler starting...");

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let streamer_repo = Arc::new(PgStreamerRepository::new(pool.clone()));
    let platforms = Arc::new(StreamingProviderRegistry::with_defaults(http.clone()));
    let notifiers = Arc::new(NotificationProviderRegistry::with_defaults(http, &config));
    tracing::info!(
        platforms = ?platforms.supported_platforms(),
        channels = ?notifiers.supported_channels(),
        "Providers registered"
    );

    let streamers = Arc::new(StreamerService::new(streamer_repo.clone(), platforms));
    let reminder: Arc<dyn Job> = Arc::new(BroadcastReminder::new(
        streamer_repo,
        Arc::new(PgFollowRepository::new(pool.clone())),
        Arc::new(PgNotificationChannelRepository::new(pool)),
        streamers,
        notifiers,
    ));

    let mut scheduler = CronScheduler::new();
    match &config.redis_url {
        Some(url) => {
            let lock = RedisJobLock::connect(url, config.job_lock_ttl_secs).await?;
            scheduler = scheduler.with_lock(Arc::new(lock));
        }
        None => tracing::warn!("REDIS_URL not set, jobs run without cross-process leases"),
    }

    let registry = JobRegistry::new(vec![reminder]);
    let scheduled = registry.register_all(&config.jobs, &mut scheduler)?;
    if scheduled == 0 {
        tracing::warn!("No jobs enabled");
    }
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    scheduler.shutdown().await;

    tracing::info!("OnAir scheduler stopped.");
    Ok(())
}

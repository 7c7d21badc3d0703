use std::collections::HashMap;

use serde::Deserialize;

/// Name of the broadcast reminder job, used as its config and registry key.
pub const BROADCAST_REMINDER_JOB: &str = "broadcast_reminder";

/// Default cron expression for the broadcast reminder (every two minutes).
const DEFAULT_REMINDER_CRON: &str = "0 */2 * * * *";

/// Schedule settings for one job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobConfig {
    pub enabled: bool,
    /// Cron expression with a seconds field (`sec min hour dom mon dow [year]`).
    pub cron_expr: String,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string; enables cross-process job leases when set
    pub redis_url: Option<String>,

    /// Lifetime of a job lease in seconds (default: 600)
    pub job_lock_ttl_secs: u64,

    /// Timeout applied to outbound HTTP requests in seconds (default: 10)
    pub http_timeout_secs: u64,

    /// Service-wide Telegram bot token, used when a channel does not carry its own
    pub telegram_bot_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// `json` (default) or `pretty`
    pub log_format: String,

    /// Job schedules keyed by job name
    pub jobs: HashMap<String, JobConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            job_lock_ttl_secs: std::env::var("JOB_LOCK_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JOB_LOCK_TTL_SECS must be a valid u64"))?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            jobs: parse_job_configs(std::env::vars())?,
        })
    }
}

/// Collect `JOB_<NAME>_CRON` / `JOB_<NAME>_ENABLED` pairs into job configs.
///
/// A job is enabled unless `_ENABLED` says otherwise. The broadcast reminder gets a
/// default schedule when it is not configured at all; any other name needs a
/// `_CRON` value and is ignored with a warning without one.
pub fn parse_job_configs(
    vars: impl IntoIterator<Item = (String, String)>,
) -> anyhow::Result<HashMap<String, JobConfig>> {
    let mut crons: HashMap<String, String> = HashMap::new();
    let mut flags: HashMap<String, (String, String)> = HashMap::new();

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix("JOB_") else {
            continue;
        };
        if let Some(name) = rest.strip_suffix("_CRON") {
            crons.insert(name.to_ascii_lowercase(), value.trim().to_string());
        } else if let Some(name) = rest.strip_suffix("_ENABLED") {
            flags.insert(name.to_ascii_lowercase(), (key.clone(), value));
        }
    }

    let mut names: Vec<String> = crons.keys().chain(flags.keys()).cloned().collect();
    names.push(BROADCAST_REMINDER_JOB.to_string());
    names.sort();
    names.dedup();

    let mut jobs = HashMap::with_capacity(names.len());
    for name in names {
        let cron_expr = match crons.remove(&name) {
            Some(expr) => expr,
            None if name == BROADCAST_REMINDER_JOB => DEFAULT_REMINDER_CRON.to_string(),
            None => {
                tracing::warn!(job = %name, "Ignoring job flag without a JOB_<NAME>_CRON schedule");
                continue;
            }
        };
        let enabled = match flags.get(&name) {
            Some((key, value)) => parse_flag(key, value)?,
            None => true,
        };
        jobs.insert(name, JobConfig { enabled, cron_expr });
    }

    Ok(jobs)
}

fn parse_flag(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got '{}'", key, other),
    }
}

//! Cross-process job lease.
//!
//! Before each run the scheduler takes `job:lock:<name>` with `SET NX EX`, so only
//! one process in a deployment executes a given job at a time. The TTL bounds how
//! long a crashed holder can block other processes. Release only deletes the key
//! when it still holds this process's owner token.

use async_trait::async_trait;
use onair_common::error::AppError;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use uuid::Uuid;

/// Default lease duration in seconds (10 minutes).
pub const DEFAULT_LEASE_SECS: u64 = 600;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait JobLock: Send + Sync {
    /// Returns `true` when the lease was taken, `false` when another process holds it.
    async fn try_acquire(&self, job_name: &str) -> Result<bool, AppError>;

    async fn release(&self, job_name: &str) -> Result<(), AppError>;
}

/// Redis-backed job lease.
pub struct RedisJobLock {
    conn: ConnectionManager,
    ttl_secs: u64,
    /// Identifies this process as the lease holder.
    owner: String,
}

impl RedisJobLock {
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Result<Self, AppError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(ttl_secs, "Connected to Redis for job leases");
        Ok(Self::new(conn, ttl_secs))
    }

    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            conn,
            ttl_secs: if ttl_secs == 0 { DEFAULT_LEASE_SECS } else { ttl_secs },
            owner: Uuid::new_v4().to_string(),
        }
    }

    pub fn key(job_name: &str) -> String {
        format!("job:lock:{}", job_name)
    }
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn try_acquire(&self, job_name: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let key = Self::key(job_name);

        // SET key owner NX EX ttl
        // Some("OK") when the key was set, None when it already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&self.owner)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;

        let acquired = result.is_some();
        if !acquired {
            tracing::debug!(job = job_name, "Job lease held by another process");
        }
        Ok(acquired)
    }

    async fn release(&self, job_name: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(Self::key(job_name))
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            tracing::warn!(job = job_name, "Job lease expired before release");
        }
        Ok(())
    }
}

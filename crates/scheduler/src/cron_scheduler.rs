//! Cron-driven job runner.
//!
//! Every registered job gets its own task that sleeps until the next fire time and
//! then runs the job inline. A job therefore never overlaps itself, and fire times
//! that pass while it is running are skipped rather than queued.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use cron::Schedule;
use onair_common::error::AppError;
use onair_engine::Job;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lock::JobLock;

/// Parse a cron expression with a seconds field (`sec min hour dom mon dow [year]`).
pub fn parse_schedule(expr: &str) -> Result<Schedule, AppError> {
    Schedule::from_str(expr.trim())
        .map_err(|e| AppError::Config(format!("invalid cron expression '{}': {}", expr, e)))
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

pub struct CronScheduler {
    jobs: Vec<ScheduledJob>,
    lock: Option<Arc<dyn JobLock>>,
    root: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            lock: None,
            root: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Guard every run with a cross-process lease.
    pub fn with_lock(mut self, lock: Arc<dyn JobLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn add_job(&mut self, job: Arc<dyn Job>, cron_expr: &str) -> Result<(), AppError> {
        let schedule = parse_schedule(cron_expr)?;
        tracing::info!(job = job.name(), cron = cron_expr, "Job scheduled");
        self.jobs.push(ScheduledJob { job, schedule });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|s| s.job.name()).collect()
    }

    /// Spawn one task per scheduled job.
    pub fn start(&mut self) {
        for scheduled in self.jobs.drain(..) {
            let token = self.root.child_token();
            let lock = self.lock.clone();
            self.handles
                .push(tokio::spawn(run_loop(scheduled, lock, token)));
        }
        tracing::info!(tasks = self.handles.len(), "Scheduler started");
    }

    /// Cancel every job (including runs in progress) and wait for the tasks to exit.
    pub async fn shutdown(self) {
        self.root.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(scheduled: ScheduledJob, lock: Option<Arc<dyn JobLock>>, token: CancellationToken) {
    let name = scheduled.job.name();
    loop {
        let Some(next) = scheduled.schedule.upcoming(Utc).next() else {
            tracing::warn!(job = name, "Schedule has no upcoming fire times");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        run_once(scheduled.job.as_ref(), lock.as_deref(), &token).await;
        if token.is_cancelled() {
            return;
        }
    }
}

async fn run_once(job: &dyn Job, lock: Option<&dyn JobLock>, token: &CancellationToken) {
    let name = job.name();

    if let Some(lock) = lock {
        match lock.try_acquire(name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job = name, "Skipping tick, job running elsewhere");
                return;
            }
            Err(e) => {
                tracing::warn!(job = name, error = %e, "Failed to acquire job lease, skipping tick");
                return;
            }
        }
    }

    let started = Instant::now();
    tracing::info!(job = name, "Job started");
    let result = job.execute(token.child_token()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => tracing::info!(job = name, elapsed_ms, "Job completed"),
        Err(e) if e.is_cancelled() => tracing::info!(job = name, elapsed_ms, "Job cancelled"),
        Err(e) => tracing::error!(job = name, elapsed_ms, error = %e, "Job failed"),
    }

    if let Some(lock) = lock
        && let Err(e) = lock.release(name).await
    {
        tracing::warn!(job = name, error = %e, "Failed to release job lease");
    }
}

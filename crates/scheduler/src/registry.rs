use std::collections::HashMap;
use std::sync::Arc;

use onair_common::config::JobConfig;
use onair_common::error::AppError;
use onair_engine::Job;

use crate::cron_scheduler::CronScheduler;

/// Jobs this process knows how to run, keyed by [`Job::name`].
pub struct JobRegistry {
    jobs: HashMap<&'static str, Arc<dyn Job>>,
}

impl JobRegistry {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        let jobs = jobs.into_iter().map(|job| (job.name(), job)).collect();
        Self { jobs }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).cloned()
    }

    /// Schedule every enabled job in `configs`, returning how many were added.
    ///
    /// Configured names with no registered job are skipped with a warning. An
    /// invalid cron expression on an enabled job is a configuration error.
    pub fn register_all(
        &self,
        configs: &HashMap<String, JobConfig>,
        scheduler: &mut CronScheduler,
    ) -> Result<usize, AppError> {
        let mut names: Vec<&String> = configs.keys().collect();
        names.sort();

        let mut registered = 0;
        for name in names {
            let config = &configs[name];
            let Some(job) = self.get(name) else {
                tracing::warn!(job = %name, "No job registered under configured name, skipping");
                continue;
            };

            if !config.enabled {
                tracing::info!(job = %name, "Job disabled, not scheduling");
                continue;
            }

            scheduler.add_job(job, &config.cron_expr)?;
            registered += 1;
        }
        Ok(registered)
    }
}

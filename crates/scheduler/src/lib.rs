pub mod cron_scheduler;
pub mod lock;
pub mod registry;

pub use cron_scheduler::CronScheduler;
pub use lock::{JobLock, RedisJobLock};
pub use registry::JobRegistry;

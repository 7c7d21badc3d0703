use async_trait::async_trait;
use onair_common::error::AppError;
use tokio_util::sync::CancellationToken;

/// A unit of scheduled work.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name, used as the config key and in logs.
    fn name(&self) -> &'static str;

    /// Run once. Implementations return `AppError::Cancelled` when `token` fires mid-run.
    async fn execute(&self, token: CancellationToken) -> Result<(), AppError>;
}

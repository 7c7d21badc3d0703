pub mod broadcast_reminder;
pub mod channel_resolver;
pub mod job;
pub mod streamer_service;

pub use broadcast_reminder::{BroadcastReminder, SweepSummary};
pub use job::Job;
pub use streamer_service::{StreamerRefresher, StreamerService};

//! Scheduled jobs: cron, fixed-interval and one-shot triggers over a
//! durable store.

mod clock;
mod job;
mod service;
mod store;
mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use job::{JobDefinition, JobPayload, JobStatus, RunStatus, new_job_id};
pub use service::{JobRunOutcome, JobRunner, Scheduler, TickReport};
pub use store::{JobStore, JsonFileStore, MemoryJobStore, RunUpdate};
pub use trigger::{Trigger, parse_timestamp};

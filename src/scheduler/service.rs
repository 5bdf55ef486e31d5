//! Scheduler service: job management and the tick loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::error::SchedulerError;
use crate::scheduler::clock::Clock;
use crate::scheduler::job::{JobDefinition, JobStatus, RunStatus};
use crate::scheduler::store::{JobStore, RunUpdate};
use crate::tools::ToolError;

/// What happened when a job was handed to its runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunOutcome {
    /// Work was started; `run_id` identifies it in logs.
    Dispatched { run_id: String },
    /// The runner decided there was nothing to do.
    Skipped { reason: String },
}

/// Executes the payload of a due job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: &JobDefinition) -> Result<JobRunOutcome, ToolError>;
}

/// Summary of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs claimed and handed to the runner.
    pub dispatched: Vec<String>,
    /// Of those, the ones whose runner returned an error.
    pub failed: Vec<String>,
    /// Due jobs another tick claimed first.
    pub lost_claims: Vec<String>,
}

/// Owns job definitions and fires them when due.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate and store a new job, computing its first run.
    pub async fn add_job(&self, mut job: JobDefinition) -> Result<JobDefinition, SchedulerError> {
        job.trigger.validate()?;
        if job.payload.message.trim().is_empty() {
            return Err(SchedulerError::InvalidTrigger(
                "job message cannot be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        job.next_run = job.trigger.first_run(now)?;
        if job.next_run.is_none() {
            return Err(SchedulerError::InvalidTrigger(format!(
                "{} never fires",
                job.trigger.describe()
            )));
        }
        job.status = JobStatus::Scheduled;
        job.created_at = now;
        job.updated_at = now;

        self.store.insert(job.clone()).await?;
        tracing::info!(job_id = %job.id, name = %job.name, trigger = %job.trigger.describe(), "Added job");
        Ok(job)
    }

    /// Jobs sorted by next run; disabled and completed ones only on request.
    pub async fn list_jobs(&self, include_disabled: bool) -> Result<Vec<JobDefinition>, SchedulerError> {
        let mut jobs: Vec<JobDefinition> = self
            .store
            .list_jobs()
            .await?
            .into_iter()
            .filter(|j| include_disabled || (j.enabled && j.status != JobStatus::Completed))
            .collect();
        jobs.sort_by_key(|j| j.next_run.unwrap_or(DateTime::<Utc>::MAX_UTC));
        Ok(jobs)
    }

    pub async fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
        if self.store.remove(id).await? {
            tracing::info!(job_id = %id, "Removed job");
            Ok(())
        } else {
            Err(SchedulerError::NotFound { id: id.to_string() })
        }
    }

    /// Enable or disable a job. Re-enabling recomputes its next run.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<JobDefinition, SchedulerError> {
        let mut job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound { id: id.to_string() })?;

        let now = self.clock.now();
        if enabled && !job.enabled && job.trigger.is_recurring() {
            job.next_run = job.trigger.next_after(now)?;
        }
        job.enabled = enabled;
        job.updated_at = now;
        self.store.upsert(job.clone()).await?;
        Ok(job)
    }

    /// Repair state left behind by a previous process.
    ///
    /// Jobs stuck in `Dispatched` (the process died mid-run) go back to
    /// `Scheduled`. A recurring job whose stored next run lies in the past
    /// keeps it, so it fires once on the next tick instead of replaying every
    /// missed instant. A stored next run later than the trigger now implies
    /// is pulled in.
    pub async fn reconcile(&self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let mut repaired = 0;

        for mut job in self.store.list_jobs().await? {
            let mut changed = false;

            if job.status == JobStatus::Dispatched {
                job.status = JobStatus::Scheduled;
                changed = true;
            }

            if job.status == JobStatus::Scheduled && job.trigger.is_recurring() {
                let fresh = job.trigger.next_after(now)?;
                let keep_past = job.next_run.is_some_and(|t| t <= now);
                if !keep_past && fresh.is_some() && (job.next_run.is_none() || fresh < job.next_run) {
                    job.next_run = fresh;
                    changed = true;
                }
            }

            if changed {
                job.updated_at = now;
                tracing::debug!(job_id = %job.id, next_run = ?job.next_run, "Reconciled job");
                self.store.upsert(job).await?;
                repaired += 1;
            }
        }

        if repaired > 0 {
            tracing::info!("Reconciled {} jobs after restart", repaired);
        }
        Ok(repaired)
    }

    /// Fire every due job once.
    ///
    /// Each job is claimed before it runs, so overlapping ticks never
    /// dispatch the same firing twice. Failures are recorded on the job and
    /// do not stop the rest of the tick.
    pub async fn tick(&self, runner: &dyn JobRunner) -> Result<TickReport, SchedulerError> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let due: Vec<JobDefinition> = self
            .store
            .list_jobs()
            .await?
            .into_iter()
            .filter(|j| j.is_due(now))
            .collect();

        for job in due {
            match self.store.claim(&job.id, job.next_run).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(job_id = %job.id, "Job already claimed elsewhere");
                    report.lost_claims.push(job.id);
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, "Failed to claim job: {}", e);
                    report.failed.push(job.id);
                    continue;
                }
            }

            let id = job.id.clone();
            report.dispatched.push(id.clone());
            if !self.run_claimed(job, runner).await {
                report.failed.push(id);
            }
        }

        Ok(report)
    }

    /// Run a claimed job and record the outcome. Returns whether it succeeded.
    async fn run_claimed(&self, job: JobDefinition, runner: &dyn JobRunner) -> bool {
        let fired_at = self.clock.now();
        tracing::info!(job_id = %job.id, name = %job.name, "Running job");

        let outcome = runner.run_job(&job).await;
        let succeeded = outcome.is_ok();

        let (last_status, last_error) = match outcome {
            Ok(JobRunOutcome::Dispatched { run_id }) => {
                tracing::debug!(job_id = %job.id, run_id = %run_id, "Job dispatched");
                (RunStatus::Ok, None)
            }
            Ok(JobRunOutcome::Skipped { reason }) => {
                tracing::debug!(job_id = %job.id, "Job skipped: {}", reason);
                (RunStatus::Skipped, None)
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Job failed: {}", e);
                (RunStatus::Error, Some(e.to_string()))
            }
        };

        let mut update = RunUpdate {
            fired_at,
            finished_at: self.clock.now(),
            last_status,
            last_error,
            status: JobStatus::Completed,
            next_run: None,
            disable: false,
            remove: false,
        };
        if job.trigger.is_recurring() {
            update.status = JobStatus::Scheduled;
            match job.trigger.next_after(fired_at) {
                Ok(next) => update.next_run = next,
                Err(e) => {
                    tracing::error!(job_id = %job.id, "Cannot compute next run: {}", e);
                    update.disable = true;
                }
            }
        } else {
            update.remove = job.delete_after_run;
        }

        match self.store.finish_run(&job.id, update).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(job_id = %job.id, "Job changed during its run, outcome not recorded");
            }
            Err(e) => tracing::error!(job_id = %job.id, "Failed to record job run: {}", e),
        }
        succeeded
    }

    /// Reconcile, then tick every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, runner: Arc<dyn JobRunner>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.reconcile().await {
                tracing::error!("Scheduler reconcile failed: {}", e);
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = interval.as_secs(), "Scheduler started");

            loop {
                ticker.tick().await;
                match self.tick(runner.as_ref()).await {
                    Ok(report) if !report.dispatched.is_empty() => {
                        tracing::info!(
                            dispatched = report.dispatched.len(),
                            failed = report.failed.len(),
                            "Scheduler tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Scheduler tick failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::clock::ManualClock;
    use crate::scheduler::job::JobPayload;
    use crate::scheduler::store::MemoryJobStore;
    use crate::scheduler::trigger::Trigger;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        runs: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run_job(&self, job: &JobDefinition) -> Result<JobRunOutcome, ToolError> {
            self.runs.lock().unwrap().push(job.id.clone());
            if self.fail_on.as_deref() == Some(job.id.as_str()) {
                return Err(ToolError::ExecutionFailed("boom".to_string()));
            }
            Ok(JobRunOutcome::Dispatched {
                run_id: format!("run-{}", job.id),
            })
        }
    }

    fn setup() -> (Scheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let scheduler = Scheduler::new(Arc::new(MemoryJobStore::new()), clock.clone());
        (scheduler, clock)
    }

    fn job(id: &str, trigger: Trigger) -> JobDefinition {
        JobDefinition::new(id, trigger, JobPayload::message("do it")).with_id(id)
    }

    #[tokio::test]
    async fn test_failing_job_does_not_block_others() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("bad", Trigger::every(10))).await.unwrap();
        scheduler.add_job(job("good", Trigger::every(10))).await.unwrap();
        clock.advance(Duration::from_secs(10));

        let runner = RecordingRunner {
            fail_on: Some("bad".to_string()),
            ..Default::default()
        };
        let report = scheduler.tick(&runner).await.unwrap();

        assert_eq!(report.dispatched.len(), 2);
        assert_eq!(report.failed, vec!["bad".to_string()]);

        let bad = scheduler.store().get("bad").await.unwrap().unwrap();
        assert_eq!(bad.last_status, Some(RunStatus::Error));
        assert!(bad.last_error.unwrap().contains("boom"));
        assert_eq!(bad.status, JobStatus::Scheduled);

        let good = scheduler.store().get("good").await.unwrap().unwrap();
        assert_eq!(good.last_status, Some(RunStatus::Ok));
    }

    #[tokio::test]
    async fn test_disabled_jobs_do_not_fire() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("j", Trigger::every(5))).await.unwrap();
        scheduler.set_enabled("j", false).await.unwrap();
        clock.advance(Duration::from_secs(60));

        let runner = RecordingRunner::default();
        let report = scheduler.tick(&runner).await.unwrap();
        assert!(report.dispatched.is_empty());

        let enabled = scheduler.set_enabled("j", true).await.unwrap();
        assert_eq!(enabled.next_run, Some(clock.now() + chrono::Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_delete_after_run_removes_one_shot() {
        let (scheduler, clock) = setup();
        let at = clock.now() + chrono::Duration::seconds(30);
        scheduler
            .add_job(job("once", Trigger::at(at)).with_delete_after_run(true))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(31));

        scheduler.tick(&RecordingRunner::default()).await.unwrap();
        assert!(scheduler.store().get("once").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_resets_dispatched_and_fires_missed_once() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("r", Trigger::every(60))).await.unwrap();
        let stored = scheduler.store().get("r").await.unwrap().unwrap();
        assert!(scheduler.store().claim("r", stored.next_run).await.unwrap());

        // Down for ten periods.
        clock.advance(Duration::from_secs(600));
        assert_eq!(scheduler.reconcile().await.unwrap(), 1);

        let runner = RecordingRunner::default();
        scheduler.tick(&runner).await.unwrap();
        scheduler.tick(&runner).await.unwrap();
        assert_eq!(runner.runs.lock().unwrap().len(), 1);

        let after = scheduler.store().get("r").await.unwrap().unwrap();
        assert_eq!(after.next_run, Some(clock.now() + chrono::Duration::seconds(60)));
    }

    /// Changes the job behind the scheduler's back while it runs.
    struct MeddlingRunner {
        store: Arc<dyn JobStore>,
        remove: bool,
    }

    #[async_trait]
    impl JobRunner for MeddlingRunner {
        async fn run_job(&self, job: &JobDefinition) -> Result<JobRunOutcome, ToolError> {
            if self.remove {
                self.store.remove(&job.id).await.unwrap();
            } else {
                let mut current = self.store.get(&job.id).await.unwrap().unwrap();
                current.enabled = false;
                self.store.upsert(current).await.unwrap();
            }
            Ok(JobRunOutcome::Dispatched {
                run_id: "r1".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_job_removed_during_run_stays_removed() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("j", Trigger::every(10))).await.unwrap();
        clock.advance(Duration::from_secs(10));

        let runner = MeddlingRunner {
            store: scheduler.store().clone(),
            remove: true,
        };
        let report = scheduler.tick(&runner).await.unwrap();
        assert_eq!(report.dispatched, vec!["j".to_string()]);
        assert!(scheduler.store().get("j").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_job_disabled_during_run_stays_disabled() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("j", Trigger::every(10))).await.unwrap();
        clock.advance(Duration::from_secs(10));
        let fired_at = clock.now();

        let runner = MeddlingRunner {
            store: scheduler.store().clone(),
            remove: false,
        };
        scheduler.tick(&runner).await.unwrap();

        let stored = scheduler.store().get("j").await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.status, JobStatus::Scheduled);
        assert_eq!(stored.last_run, Some(fired_at));
        assert_eq!(stored.last_status, Some(RunStatus::Ok));
    }

    async fn wait_for_runs(runner: &RecordingRunner, n: usize) {
        for _ in 0..200 {
            if runner.runs.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_spawned_loop_ticks_until_aborted() {
        let (scheduler, clock) = setup();
        scheduler.add_job(job("loop", Trigger::every(10))).await.unwrap();
        clock.advance(Duration::from_secs(10));

        let runner = Arc::new(RecordingRunner::default());
        let scheduler = Arc::new(scheduler);
        let handle = scheduler
            .clone()
            .spawn(runner.clone(), Duration::from_millis(10));

        let runs = || runner.runs.lock().unwrap().len();

        wait_for_runs(&runner, 1).await;
        assert_eq!(runs(), 1);

        // Not due again until the clock moves.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs(), 1);

        clock.advance(Duration::from_secs(10));
        wait_for_runs(&runner, 2).await;
        assert_eq!(runs(), 2);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_remove_missing_job_is_not_found() {
        let (scheduler, _) = setup();
        let err = scheduler.remove_job("nope").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_trigger_rejected() {
        let (scheduler, _) = setup();
        let err = scheduler
            .add_job(job("bad", Trigger::cron("61 * * * *", None)))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTrigger(_)));
        assert!(scheduler.list_jobs(true).await.unwrap().is_empty());
    }
}

//! Durable job storage.
//!
//! [`JsonFileStore`] keeps every job in one JSON document. Each operation
//! takes an exclusive lock on a sibling `.lock` file, reads the document,
//! applies its change and replaces the document with an atomic rename, so
//! claims stay exclusive across processes sharing the file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SchedulerError;
use crate::scheduler::job::{JobDefinition, JobStatus, RunStatus};

const STORE_VERSION: u32 = 1;

/// Outcome of one run, applied by [`JobStore::finish_run`] to whatever is
/// stored when the run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub fired_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub last_status: RunStatus,
    pub last_error: Option<String>,
    /// `Scheduled` for recurring jobs, `Completed` for one-shots.
    pub status: JobStatus,
    pub next_run: Option<DateTime<Utc>>,
    /// The trigger can no longer produce a next run.
    pub disable: bool,
    /// Drop the job instead of keeping it.
    pub remove: bool,
}

impl RunUpdate {
    fn apply(self, job: &mut JobDefinition) {
        job.last_run = Some(self.fired_at);
        job.last_status = Some(self.last_status);
        job.last_error = self.last_error;
        job.status = self.status;
        job.next_run = self.next_run;
        if self.disable {
            job.enabled = false;
        }
        job.updated_at = self.finished_at;
    }
}

/// Persistence for job definitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs, ordered by id.
    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, SchedulerError>;

    async fn get(&self, id: &str) -> Result<Option<JobDefinition>, SchedulerError>;

    /// Add a job; fails with `Conflict` if the id is taken.
    async fn insert(&self, job: JobDefinition) -> Result<(), SchedulerError>;

    /// Insert or replace.
    async fn upsert(&self, job: JobDefinition) -> Result<(), SchedulerError>;

    /// Atomically move a job from `Scheduled` to `Dispatched`.
    ///
    /// Succeeds only if the job is still scheduled for `expected_next_run`,
    /// i.e. nobody claimed (and possibly already rescheduled) it since the
    /// caller read it.
    async fn claim(
        &self,
        id: &str,
        expected_next_run: Option<DateTime<Utc>>,
    ) -> Result<bool, SchedulerError>;

    /// Record the end of a run on a job that is still `Dispatched`.
    ///
    /// Fields the run does not own (enabled flag, payload, trigger) keep
    /// their current stored values. Returns false without writing if the
    /// job was removed or is no longer dispatched.
    async fn finish_run(&self, id: &str, update: RunUpdate) -> Result<bool, SchedulerError>;

    /// Remove a job, returning whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, SchedulerError>;
}

type JobMap = BTreeMap<String, JobDefinition>;

fn claim_in(jobs: &mut JobMap, id: &str, expected_next_run: Option<DateTime<Utc>>) -> bool {
    match jobs.get_mut(id) {
        Some(job) if job.status == JobStatus::Scheduled && job.next_run == expected_next_run => {
            job.status = JobStatus::Dispatched;
            job.updated_at = Utc::now();
            true
        }
        _ => false,
    }
}

fn finish_in(jobs: &mut JobMap, id: &str, update: RunUpdate) -> bool {
    match jobs.get_mut(id) {
        Some(job) if job.status == JobStatus::Dispatched => {
            if update.remove {
                jobs.remove(id);
            } else {
                update.apply(job);
            }
            true
        }
        _ => false,
    }
}

fn insert_in(jobs: &mut JobMap, job: JobDefinition) -> Result<(), SchedulerError> {
    if jobs.contains_key(&job.id) {
        return Err(SchedulerError::Conflict { id: job.id });
    }
    jobs.insert(job.id.clone(), job);
    Ok(())
}

/// In-memory store, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<JobMap>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, SchedulerError> {
        Ok(self.jobs.lock().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<JobDefinition>, SchedulerError> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn insert(&self, job: JobDefinition) -> Result<(), SchedulerError> {
        insert_in(&mut *self.jobs.lock().await, job)
    }

    async fn upsert(&self, job: JobDefinition) -> Result<(), SchedulerError> {
        self.jobs.lock().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn claim(
        &self,
        id: &str,
        expected_next_run: Option<DateTime<Utc>>,
    ) -> Result<bool, SchedulerError> {
        Ok(claim_in(&mut *self.jobs.lock().await, id, expected_next_run))
    }

    async fn finish_run(&self, id: &str, update: RunUpdate) -> Result<bool, SchedulerError> {
        Ok(finish_in(&mut *self.jobs.lock().await, id, update))
    }

    async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        Ok(self.jobs.lock().await.remove(id).is_some())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    jobs: Vec<JobDefinition>,
}

/// Job store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: Arc<PathBuf>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the job map under the cross-process lock, writing the
    /// map back when `f` reports a change.
    async fn with_jobs<T, F>(&self, f: F) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut JobMap) -> Result<(T, bool), SchedulerError> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let _lock = lock_store(&path)?;
            let mut jobs = read_jobs(&path)?;
            let (value, changed) = f(&mut jobs)?;
            if changed {
                write_jobs(&path, &jobs)?;
            }
            Ok(value)
        })
        .await
        .map_err(|e| SchedulerError::Store(format!("store task failed: {}", e)))?
    }
}

fn store_err(action: &str, path: &Path, e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Store(format!("{} {}: {}", action, path.display(), e))
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Exclusive lock held until the returned file is dropped.
fn lock_store(path: &Path) -> Result<File, SchedulerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| store_err("creating directory for", path, e))?;
    }
    let lock = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock)
        .map_err(|e| store_err("opening lock", &lock, e))?;
    file.lock_exclusive()
        .map_err(|e| store_err("locking", &lock, e))?;
    Ok(file)
}

fn read_jobs(path: &Path) -> Result<JobMap, SchedulerError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobMap::new()),
        Err(e) => return Err(store_err("reading", path, e)),
    };
    if text.trim().is_empty() {
        return Ok(JobMap::new());
    }
    let file: StoreFile = serde_json::from_str(&text).map_err(|e| store_err("parsing", path, e))?;
    if file.version > STORE_VERSION {
        return Err(store_err(
            "reading",
            path,
            format!("unsupported store version {}", file.version),
        ));
    }
    Ok(file.jobs.into_iter().map(|j| (j.id.clone(), j)).collect())
}

fn write_jobs(path: &Path, jobs: &JobMap) -> Result<(), SchedulerError> {
    let file = StoreFile {
        version: STORE_VERSION,
        jobs: jobs.values().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&file).map_err(|e| store_err("encoding", path, e))?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut out = File::create(&tmp).map_err(|e| store_err("creating", &tmp, e))?;
    out.write_all(json.as_bytes())
        .and_then(|_| out.sync_all())
        .map_err(|e| store_err("writing", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| store_err("replacing", path, e))
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, SchedulerError> {
        self.with_jobs(|jobs| Ok((jobs.values().cloned().collect(), false)))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<JobDefinition>, SchedulerError> {
        let id = id.to_string();
        self.with_jobs(move |jobs| Ok((jobs.get(&id).cloned(), false)))
            .await
    }

    async fn insert(&self, job: JobDefinition) -> Result<(), SchedulerError> {
        self.with_jobs(move |jobs| insert_in(jobs, job).map(|()| ((), true)))
            .await
    }

    async fn upsert(&self, job: JobDefinition) -> Result<(), SchedulerError> {
        self.with_jobs(move |jobs| {
            jobs.insert(job.id.clone(), job);
            Ok(((), true))
        })
        .await
    }

    async fn claim(
        &self,
        id: &str,
        expected_next_run: Option<DateTime<Utc>>,
    ) -> Result<bool, SchedulerError> {
        let id = id.to_string();
        self.with_jobs(move |jobs| {
            let claimed = claim_in(jobs, &id, expected_next_run);
            Ok((claimed, claimed))
        })
        .await
    }

    async fn finish_run(&self, id: &str, update: RunUpdate) -> Result<bool, SchedulerError> {
        let id = id.to_string();
        self.with_jobs(move |jobs| {
            let applied = finish_in(jobs, &id, update);
            Ok((applied, applied))
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        let id = id.to_string();
        self.with_jobs(move |jobs| {
            let removed = jobs.remove(&id).is_some();
            Ok((removed, removed))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::JobPayload;
    use crate::scheduler::trigger::Trigger;
    use pretty_assertions::assert_eq;

    fn job(id: &str) -> JobDefinition {
        let mut job = JobDefinition::new("test", Trigger::every(60), JobPayload::message("ping"))
            .with_id(id);
        job.next_run = Some(Utc::now());
        job
    }

    async fn exercise(store: &dyn JobStore) {
        store.insert(job("a")).await.unwrap();
        let err = store.insert(job("a")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Conflict { .. }));

        let original = store.get("a").await.unwrap().unwrap();
        assert!(store.claim("a", original.next_run).await.unwrap());
        assert!(!store.claim("a", original.next_run).await.unwrap());
        assert_eq!(
            store.get("a").await.unwrap().unwrap().status,
            JobStatus::Dispatched
        );

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert!(store.list_jobs().await.unwrap().is_empty());
    }

    fn finished(at: DateTime<Utc>) -> RunUpdate {
        RunUpdate {
            fired_at: at,
            finished_at: at,
            last_status: RunStatus::Ok,
            last_error: None,
            status: JobStatus::Scheduled,
            next_run: Some(at + chrono::Duration::seconds(60)),
            disable: false,
            remove: false,
        }
    }

    #[tokio::test]
    async fn test_finish_run_keeps_concurrent_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("jobs.json"));
        let original = job("c");
        store.insert(original.clone()).await.unwrap();
        assert!(store.claim("c", original.next_run).await.unwrap());

        // Disabled while the run was in flight.
        let mut disabled = store.get("c").await.unwrap().unwrap();
        disabled.enabled = false;
        store.upsert(disabled).await.unwrap();

        let now = Utc::now();
        assert!(store.finish_run("c", finished(now)).await.unwrap());
        let stored = store.get("c").await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.status, JobStatus::Scheduled);
        assert_eq!(stored.last_run, Some(now));

        // Not dispatched any more: nothing to finish.
        assert!(!store.finish_run("c", finished(now)).await.unwrap());
        // Removed mid-run: stays removed.
        assert!(!store.finish_run("gone", finished(now)).await.unwrap());
        assert!(store.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn test_json_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&JsonFileStore::new(dir.path().join("cron/jobs.json"))).await;
    }

    #[tokio::test]
    async fn test_claim_rejects_stale_next_run() {
        let store = MemoryJobStore::new();
        let original = job("b");
        store.insert(original.clone()).await.unwrap();

        let mut rescheduled = original.clone();
        rescheduled.next_run = original.next_run.map(|t| t + chrono::Duration::seconds(60));
        store.upsert(rescheduled).await.unwrap();

        assert!(!store.claim("b", original.next_run).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        JsonFileStore::new(&path).insert(job("c")).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        let jobs = reopened.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "c");

        let text = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["version"], 1);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileStore::new(&path).list_jobs().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Store(_)));
    }
}

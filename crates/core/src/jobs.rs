use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Ingestion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub filename: String,
    pub chunks_count: usize,
}

/// One tracked asynchronous unit of work. Mutated exclusively through
/// [`JobStore`]; once a terminal state is reached no further mutation
/// is permitted, and progress never decreases while active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

/// Process-wide registry of jobs, passed explicitly to both the
/// ingestion pipeline and whatever polls status — no hidden global.
/// Updates are atomic per job (the map lock spans the whole mutation)
/// and reads return a snapshot, so polling never blocks on an
/// in-progress write beyond the map access itself.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, kind: JobKind) -> Uuid {
        let job = Self::new_job(kind);
        let id = job.id;
        self.jobs
            .write()
            .expect("job store lock poisoned")
            .insert(id, job);
        id
    }

    /// Create a job only when no job of this kind is still active,
    /// returning the active job's id otherwise. The check and the
    /// insert happen under one write lock, so two concurrent callers
    /// can never both get a fresh job.
    pub fn create_if_idle(&self, kind: JobKind) -> Result<Uuid, Uuid> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        if let Some(active) = jobs
            .values()
            .find(|job| job.kind == kind && !job.status.is_terminal())
        {
            return Err(active.id);
        }

        let job = Self::new_job(kind);
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    /// Current snapshot of a job, or `None` for an unknown id.
    pub fn snapshot(&self, id: Uuid) -> Option<Job> {
        self.jobs
            .read()
            .expect("job store lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Id of the queued or processing job of this kind, if any. Gating
    /// admission on this alone would race; use [`Self::create_if_idle`]
    /// for that.
    pub fn has_active(&self, kind: JobKind) -> Option<Uuid> {
        self.jobs
            .read()
            .expect("job store lock poisoned")
            .values()
            .find(|job| job.kind == kind && !job.status.is_terminal())
            .map(|job| job.id)
    }

    /// Advance a non-terminal job. Progress is clamped to be
    /// non-decreasing. Returns false when the job is unknown or
    /// already terminal.
    pub fn advance(&self, id: Uuid, progress: u8, message: impl Into<String>) -> bool {
        self.mutate(id, |job| {
            job.status = JobStatus::Processing;
            job.progress = job.progress.max(progress.min(100));
            job.message = message.into();
        })
    }

    pub fn complete(&self, id: Uuid, result: JobResult) -> bool {
        self.mutate(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "ingestion completed".to_string();
            job.result = Some(result);
        })
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> bool {
        let error = error.into();
        self.mutate(id, |job| {
            job.status = JobStatus::Failed;
            job.message = error.clone();
            job.error = Some(error);
        })
    }

    fn new_job(kind: JobKind) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            progress: 0,
            message: "job queued".to_string(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    fn mutate(&self, id: Uuid, apply: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        match jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                apply(job);
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_start_queued_at_zero_progress() {
        let store = JobStore::new();
        let id = store.create(JobKind::Ingestion);

        let job = store.snapshot(id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none());
    }

    #[test]
    fn progress_is_monotonic_while_active() {
        let store = JobStore::new();
        let id = store.create(JobKind::Ingestion);

        assert!(store.advance(id, 40, "embedding"));
        assert!(store.advance(id, 20, "stale update"));

        let job = store.snapshot(id).unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.message, "stale update");
    }

    #[test]
    fn terminal_states_absorb_further_updates() {
        let store = JobStore::new();
        let id = store.create(JobKind::Ingestion);

        assert!(store.complete(
            id,
            JobResult {
                filename: "a.pdf".to_string(),
                chunks_count: 12,
            }
        ));
        assert!(!store.advance(id, 50, "late stage"));
        assert!(!store.fail(id, "late failure"));

        let job = store.snapshot(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result.as_ref().unwrap().chunks_count, 12);
        assert!(job.error.is_none());
    }

    #[test]
    fn failed_jobs_carry_the_error() {
        let store = JobStore::new();
        let id = store.create(JobKind::Ingestion);
        store.fail(id, "no extractable text");

        let job = store.snapshot(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no extractable text"));
    }

    #[test]
    fn active_job_is_visible_until_terminal() {
        let store = JobStore::new();
        assert!(store.has_active(JobKind::Ingestion).is_none());

        let id = store.create(JobKind::Ingestion);
        assert_eq!(store.has_active(JobKind::Ingestion), Some(id));

        store.fail(id, "done");
        assert!(store.has_active(JobKind::Ingestion).is_none());
    }

    #[test]
    fn create_if_idle_admits_one_active_job_at_a_time() {
        let store = JobStore::new();

        let first = store.create_if_idle(JobKind::Ingestion).unwrap();
        assert_eq!(store.create_if_idle(JobKind::Ingestion), Err(first));

        store.fail(first, "gave up");
        let second = store.create_if_idle(JobKind::Ingestion).unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn unknown_jobs_are_not_updated() {
        let store = JobStore::new();
        assert!(!store.advance(Uuid::new_v4(), 10, "nope"));
        assert!(store.snapshot(Uuid::new_v4()).is_none());
    }
}

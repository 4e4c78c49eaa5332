//! In-memory job store shared between the runner and the HTTP surface.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};

use super::{Job, JobLogEntry, JobStatus, JobType, ProgressUpdate, MAX_JOB_LOGS};
use crate::error::JobError;
use crate::order::ConsolidatedOrder;

#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Creates a new job. A non-terminal job of the same type for the same
    /// user is superseded: marked failed so only the new job keeps running.
    pub fn create_job(&self, user_id: &str, job_type: JobType) -> Job {
        let job = Job::new(user_id, job_type);
        let mut jobs = self.write();

        let superseded: Vec<String> = jobs
            .values()
            .filter(|j| {
                j.user_id == user_id && j.job_type == job_type && !j.status.is_terminal()
            })
            .map(|j| j.id.clone())
            .collect();
        for id in superseded {
            if let Some(old) = jobs.get_mut(&id) {
                old.status = JobStatus::Failed;
                old.error = Some(format!("Superseded by job {}", job.id));
                old.updated_at = Utc::now();
                log::info!("Job {} superseded by {}", id, job.id);
            }
        }

        jobs.insert(job.id.clone(), job.clone());
        job
    }

    /// Terminal states are final: a superseded job's still-running task
    /// cannot resurrect it.
    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = status;
            job.updated_at = Utc::now();
        }
    }

    pub fn fail_job(&self, job_id: &str, error: impl Into<String>) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Failed;
            job.error = Some(error.into());
            job.updated_at = Utc::now();
        }
    }

    /// Merges the update into the stored progress; `None` fields keep their
    /// current value.
    pub fn update_progress(&self, job_id: &str, update: ProgressUpdate) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            if let Some(total) = update.total {
                job.progress.total = total;
            }
            if let Some(processed) = update.processed {
                job.progress.processed = processed;
            }
            if let Some(success) = update.success {
                job.progress.success = success;
            }
            if let Some(failed) = update.failed {
                job.progress.failed = failed;
            }
            if let Some(task) = update.current_task {
                job.progress.current_task = Some(task);
            }
            job.updated_at = Utc::now();
        }
    }

    pub fn set_current_email(&self, job_id: &str, subject: Option<String>) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            job.current_email = subject;
            job.updated_at = Utc::now();
        }
    }

    pub fn add_log(&self, job_id: &str, message: impl Into<String>) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            job.logs.push(JobLogEntry {
                at: Utc::now(),
                message: message.into(),
            });
            if job.logs.len() > MAX_JOB_LOGS {
                let excess = job.logs.len() - MAX_JOB_LOGS;
                job.logs.drain(..excess);
            }
            job.updated_at = Utc::now();
        }
    }

    pub fn add_orders(&self, job_id: &str, orders: Vec<ConsolidatedOrder>) {
        let mut jobs = self.write();
        if let Some(job) = jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.orders.extend(orders);
            job.updated_at = Utc::now();
        }
    }

    /// Snapshot of a job with logs most-recent-first.
    pub fn get_job(&self, job_id: &str) -> Result<Job, JobError> {
        let jobs = self.read();
        let mut job = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.logs.reverse();
        Ok(job)
    }

    /// The user's most recently created job, logs most-recent-first.
    pub fn latest_job_for_user(&self, user_id: &str) -> Option<Job> {
        let jobs = self.read();
        let mut job = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .max_by_key(|j| j.created_at)
            .cloned()?;
        job.logs.reverse();
        Some(job)
    }

    /// Ownership-checked snapshot.
    pub fn get_job_for_user(&self, job_id: &str, user_id: &str) -> Result<Job, JobError> {
        let job = self.get_job(job_id)?;
        if job.user_id != user_id {
            return Err(JobError::NotOwned {
                job_id: job_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(job)
    }

    /// Drops terminal jobs untouched for longer than `max_age_hours`, then
    /// keeps at most `max_jobs` terminal jobs (oldest dropped first).
    /// Running jobs are never pruned.
    pub fn prune(&self, max_age_hours: i64, max_jobs: usize) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.is_terminal() || job.updated_at > cutoff);

        let mut terminal: Vec<(String, chrono::DateTime<Utc>)> = jobs
            .values()
            .filter(|j| j.status.is_terminal())
            .map(|j| (j.id.clone(), j.updated_at))
            .collect();
        if terminal.len() > max_jobs {
            terminal.sort_by_key(|(_, at)| *at);
            for (id, _) in &terminal[..terminal.len() - max_jobs] {
                jobs.remove(id);
            }
        }
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let manager = JobManager::new();
        let job = manager.create_job("user-1", JobType::Suppliers);
        let fetched = manager.get_job(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.user_id, "user-1");
    }

    #[test]
    fn test_get_missing_job() {
        let manager = JobManager::new();
        assert!(matches!(
            manager.get_job("nope"),
            Err(JobError::NotFound(_))
        ));
    }

    #[test]
    fn test_ownership_check() {
        let manager = JobManager::new();
        let job = manager.create_job("user-1", JobType::Suppliers);
        assert!(manager.get_job_for_user(&job.id, "user-1").is_ok());
        assert!(matches!(
            manager.get_job_for_user(&job.id, "user-2"),
            Err(JobError::NotOwned { .. })
        ));
    }

    #[test]
    fn test_latest_job_for_user() {
        let manager = JobManager::new();
        assert!(manager.latest_job_for_user("user-1").is_none());

        let first = manager.create_job("user-1", JobType::Suppliers);
        manager.set_status(&first.id, JobStatus::Completed);
        let second = manager.create_job("user-1", JobType::Amazon);
        manager.create_job("user-2", JobType::Suppliers);

        let latest = manager.latest_job_for_user("user-1").unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.user_id, "user-1");
    }

    #[test]
    fn test_new_job_supersedes_running_one() {
        let manager = JobManager::new();
        let first = manager.create_job("user-1", JobType::Suppliers);
        manager.set_status(&first.id, JobStatus::Running);

        let second = manager.create_job("user-1", JobType::Suppliers);
        let old = manager.get_job(&first.id).unwrap();
        assert_eq!(old.status, JobStatus::Failed);
        assert!(old.error.unwrap().contains(&second.id));
        assert_eq!(
            manager.get_job(&second.id).unwrap().status,
            JobStatus::Pending
        );
    }

    #[test]
    fn test_different_type_not_superseded() {
        let manager = JobManager::new();
        let suppliers = manager.create_job("user-1", JobType::Suppliers);
        manager.create_job("user-1", JobType::Amazon);
        assert_eq!(
            manager.get_job(&suppliers.id).unwrap().status,
            JobStatus::Pending
        );
    }

    #[test]
    fn test_completed_job_not_superseded() {
        let manager = JobManager::new();
        let first = manager.create_job("user-1", JobType::Suppliers);
        manager.set_status(&first.id, JobStatus::Completed);
        manager.create_job("user-1", JobType::Suppliers);
        let old = manager.get_job(&first.id).unwrap();
        assert_eq!(old.status, JobStatus::Completed);
        assert!(old.error.is_none());
    }

    #[test]
    fn test_superseded_job_stays_failed() {
        let manager = JobManager::new();
        let first = manager.create_job("user-1", JobType::Suppliers);
        manager.set_status(&first.id, JobStatus::Running);
        manager.create_job("user-1", JobType::Suppliers);

        // The superseded job's still-running task reports completion late
        manager.add_orders(&first.id, Vec::new());
        manager.set_status(&first.id, JobStatus::Completed);

        let old = manager.get_job(&first.id).unwrap();
        assert_eq!(old.status, JobStatus::Failed);
    }

    #[test]
    fn test_progress_shallow_merge() {
        let manager = JobManager::new();
        let job = manager.create_job("user-1", JobType::Suppliers);
        manager.update_progress(
            &job.id,
            ProgressUpdate {
                total: Some(10),
                current_task: Some("Listing".to_string()),
                ..Default::default()
            },
        );
        manager.update_progress(
            &job.id,
            ProgressUpdate {
                processed: Some(4),
                ..Default::default()
            },
        );
        let progress = manager.get_job(&job.id).unwrap().progress;
        assert_eq!(progress.total, 10);
        assert_eq!(progress.processed, 4);
        assert_eq!(progress.current_task.as_deref(), Some("Listing"));
    }

    #[test]
    fn test_logs_bounded_and_newest_first() {
        let manager = JobManager::new();
        let job = manager.create_job("user-1", JobType::Suppliers);
        for i in 0..(MAX_JOB_LOGS + 10) {
            manager.add_log(&job.id, format!("line {i}"));
        }
        let logs = manager.get_job(&job.id).unwrap().logs;
        assert_eq!(logs.len(), MAX_JOB_LOGS);
        assert_eq!(logs[0].message, format!("line {}", MAX_JOB_LOGS + 9));
    }

    #[test]
    fn test_prune_keeps_active_jobs() {
        let manager = JobManager::new();
        let active = manager.create_job("user-1", JobType::Suppliers);
        manager.set_status(&active.id, JobStatus::Running);
        let done = manager.create_job("user-2", JobType::Suppliers);
        manager.set_status(&done.id, JobStatus::Completed);

        // Nothing is older than the cutoff yet
        assert_eq!(manager.prune(1, 100), 0);
        // A zero-hour cutoff drops the terminal job only
        assert_eq!(manager.prune(0, 100), 1);
        assert!(manager.get_job(&active.id).is_ok());
        assert!(manager.get_job(&done.id).is_err());
    }

    #[test]
    fn test_prune_caps_retained_terminal_jobs() {
        let manager = JobManager::new();
        let ids: Vec<String> = (0..5)
            .map(|i| {
                let job = manager.create_job(&format!("user-{i}"), JobType::Suppliers);
                manager.set_status(&job.id, JobStatus::Completed);
                job.id
            })
            .collect();

        assert_eq!(manager.prune(24, 2), 3);
        // The two most recently updated survive
        assert!(manager.get_job(&ids[3]).is_ok());
        assert!(manager.get_job(&ids[4]).is_ok());
    }
}

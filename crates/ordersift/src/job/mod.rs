//! Background extraction jobs and their in-memory bookkeeping.

pub mod manager;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::ConsolidatedOrder;

pub use manager::JobManager;
pub use runner::JobRunner;

/// Most log lines kept per job; older lines are dropped.
pub const MAX_JOB_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// Scan known supplier domains and extract orders.
    Suppliers,
    /// Amazon-only scan with catalog enrichment.
    Amazon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Emails the job intends to process.
    pub total: u32,
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Partial progress update; unset fields leave the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub total: Option<u32>,
    pub processed: Option<u32>,
    pub success: Option<u32>,
    pub failed: Option<u32>,
    pub current_task: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: JobProgress,
    /// Subject of the email currently being processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_email: Option<String>,
    /// Most recent first when read through the manager.
    pub logs: Vec<JobLogEntry>,
    pub orders: Vec<ConsolidatedOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(user_id: &str, job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            job_type,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            progress: JobProgress::default(),
            current_email: None,
            logs: Vec::new(),
            orders: Vec::new(),
            error: None,
        }
    }
}

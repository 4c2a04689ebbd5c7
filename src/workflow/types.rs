/// Core workflow and job type definitions
///
/// Jobs are the unit of scheduling; workflows only group jobs submitted together
/// and expose an aggregate progress computed at read time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque job identifier (32 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Opaque workflow identifier (32 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Handle to an exported result artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRef(pub String);

/// Job lifecycle
///
/// ```text
/// PENDING ──► RUNNING ──► SUCCEEDED | FAILED
///    └──────► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits `self -> next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis performed by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Instance segmentation of cells; aggregate is a polygon list
    CellSegmentation,
    /// Per-tile tissue coverage; aggregate is a list of tile summaries
    TissueMask,
}

impl JobType {
    /// Suffix used for the exported artifact name
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Self::CellSegmentation => "cells",
            Self::TissueMask => "tissue_mask",
        }
    }
}

/// One job as requested by a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Serialization key: jobs on one branch run one at a time, in order
    pub branch: String,
    pub job_type: JobType,
    /// Location of the whole-slide image
    pub wsi_path: String,
}

impl JobSpec {
    pub fn new(branch: impl Into<String>, job_type: JobType, wsi_path: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            job_type,
            wsi_path: wsi_path.into(),
        }
    }
}

/// A scheduled unit of tile processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub workflow_id: WorkflowId,
    pub user_id: String,
    pub branch: String,
    pub job_type: JobType,
    pub wsi_path: String,
    pub status: JobStatus,
    /// 0-100; 0 while pending, non-decreasing while running
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only on SUCCEEDED
    pub result_ref: Option<ResultRef>,
    /// Set only on FAILED
    pub error_message: Option<String>,
    /// Global submission order, used to break `created_at` ties
    #[serde(skip)]
    pub(crate) seq: u64,
}

/// A group of jobs submitted together
///
/// Membership is fixed at creation; job state lives in the store and is joined
/// in at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Member jobs in submission order
    pub job_ids: Vec<JobId>,
}

/// Read view of a workflow with its jobs and aggregate progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowView {
    pub workflow_id: WorkflowId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub progress: f64,
    pub jobs: Vec<Job>,
}

impl WorkflowView {
    pub fn new(workflow: &Workflow, jobs: Vec<Job>) -> Self {
        Self {
            workflow_id: workflow.workflow_id.clone(),
            user_id: workflow.user_id.clone(),
            created_at: workflow.created_at,
            progress: mean_progress(&jobs),
            jobs,
        }
    }
}

/// Per-job progress line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
}

/// Aggregate progress of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow_id: WorkflowId,
    pub progress: f64,
    pub jobs: Vec<JobProgress>,
}

impl From<&WorkflowView> for WorkflowProgress {
    fn from(view: &WorkflowView) -> Self {
        Self {
            workflow_id: view.workflow_id.clone(),
            progress: view.progress,
            jobs: view
                .jobs
                .iter()
                .map(|job| JobProgress {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    progress: job.progress,
                })
                .collect(),
        }
    }
}

/// Arithmetic mean of job progress; 0 for an empty slice
pub fn mean_progress(jobs: &[Job]) -> f64 {
    if jobs.is_empty() {
        return 0.0;
    }
    jobs.iter().map(|job| job.progress).sum::<f64>() / jobs.len() as f64
}

/// In-memory entity store for workflows and jobs
///
/// All job state, branch queues and the derived running indices live behind a
/// single `RwLock`, so every admission decision and every status write sees one
/// consistent snapshot. Workflow membership never changes after creation and is
/// published through an `ArcSwap` catalog for lock-free lookups.

use crate::{
    error::{SchedulerError, SchedulerResult},
    runtime::admission::{self, AdmissionLimits, AdmissionSnapshot, Candidate},
    workflow::{
        queue::BranchQueues,
        types::{Job, JobId, JobSpec, JobStatus, ResultRef, Workflow, WorkflowId, WorkflowView},
    },
};
use arc_swap::ArcSwap;
use chrono::Utc;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Final outcome reported by a worker
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { result_ref: ResultRef },
    Failed { reason: String },
}

/// Point-in-time counters over the running set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub running: usize,
    pub active_users: usize,
    pub pending: usize,
    pub busy_branches: usize,
    pub workflows: usize,
}

/// Mutable scheduler state guarded by the store lock
#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    queues: BranchQueues,
    /// branch -> RUNNING job on that branch
    running_branches: HashMap<String, JobId>,
    /// user -> count of RUNNING jobs; users drop out at zero
    active_users: HashMap<String, usize>,
    running: usize,
    next_seq: u64,
}

/// Registry of workflows and jobs with linearizable mutations
#[derive(Debug)]
pub struct EntityStore {
    state: RwLock<StoreState>,
    /// Key: workflow_id, Value: immutable membership record
    workflows: ArcSwap<HashMap<WorkflowId, Arc<Workflow>>>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Register a workflow; every job starts PENDING at the tail of its branch queue
    ///
    /// Validation happens before any mutation, so a rejected submission leaves
    /// no trace.
    pub async fn create_workflow(&self, user_id: &str, specs: Vec<JobSpec>) -> SchedulerResult<WorkflowView> {
        validate_submission(user_id, &specs)?;

        let now = Utc::now();
        let workflow_id = WorkflowId::generate();
        let mut state = self.state.write().await;

        let mut jobs = Vec::with_capacity(specs.len());
        for spec in specs {
            let job = Job {
                job_id: JobId::generate(),
                workflow_id: workflow_id.clone(),
                user_id: user_id.to_string(),
                branch: spec.branch.trim().to_string(),
                job_type: spec.job_type,
                wsi_path: spec.wsi_path.trim().to_string(),
                status: JobStatus::Pending,
                progress: 0.0,
                created_at: now,
                started_at: None,
                finished_at: None,
                result_ref: None,
                error_message: None,
                seq: state.next_seq,
            };
            state.next_seq += 1;
            state.queues.push(&job.branch, job.job_id.clone());
            state.jobs.insert(job.job_id.clone(), job.clone());
            jobs.push(job);
        }

        let workflow = Workflow {
            workflow_id: workflow_id.clone(),
            user_id: user_id.to_string(),
            created_at: now,
            job_ids: jobs.iter().map(|job| job.job_id.clone()).collect(),
        };

        // Writers are serialized by the state lock, so clone-and-swap cannot lose an insert.
        let mut catalog = (**self.workflows.load()).clone();
        catalog.insert(workflow_id, Arc::new(workflow.clone()));
        self.workflows.store(Arc::new(catalog));
        drop(state);

        tracing::info!(
            "📥 Registered workflow {} with {} jobs for user {}",
            workflow.workflow_id,
            jobs.len(),
            user_id
        );
        Ok(WorkflowView::new(&workflow, jobs))
    }

    /// Look up a workflow visible to `user_id`
    pub async fn get_workflow(&self, workflow_id: &WorkflowId, user_id: &str) -> SchedulerResult<WorkflowView> {
        let not_found = || SchedulerError::NotFound(format!("workflow {workflow_id}"));
        let workflow = self.workflows.load().get(workflow_id).cloned().ok_or_else(not_found)?;

        let state = self.state.read().await;
        let jobs = state.member_jobs(&workflow);
        if !owns_any(&jobs, user_id) {
            return Err(not_found());
        }
        Ok(WorkflowView::new(&workflow, jobs))
    }

    /// Workflows containing at least one job owned by `user_id`, oldest first
    pub async fn list_workflows(&self, user_id: &str) -> Vec<WorkflowView> {
        let catalog = self.workflows.load();
        let state = self.state.read().await;

        let mut views: Vec<WorkflowView> = catalog
            .values()
            .filter_map(|workflow| {
                let jobs = state.member_jobs(workflow);
                owns_any(&jobs, user_id).then(|| WorkflowView::new(workflow, jobs))
            })
            .collect();
        views.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.workflow_id.cmp(&b.workflow_id))
        });
        views
    }

    /// Look up a job owned by `user_id`
    pub async fn get_job(&self, job_id: &JobId, user_id: &str) -> SchedulerResult<Job> {
        let state = self.state.read().await;
        state
            .jobs
            .get(job_id)
            .filter(|job| job.user_id == user_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("job {job_id}")))
    }

    /// Apply a status write; RUNNING with a progress value is a progress update
    ///
    /// Jobs only enter RUNNING through admission, so `Pending -> Running` is
    /// rejected here.
    pub async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: Option<f64>,
    ) -> SchedulerResult<Job> {
        let mut state = self.state.write().await;
        state.apply(job_id, status, progress, None)
    }

    /// Write live progress for a RUNNING job; values never move backwards
    pub async fn record_progress(&self, job_id: &JobId, progress: f64) -> SchedulerResult<Job> {
        self.update_job_status(job_id, JobStatus::Running, Some(progress)).await
    }

    /// Move a RUNNING job to its terminal state and free its branch, user and worker slots
    pub async fn complete_job(&self, job_id: &JobId, outcome: JobOutcome) -> SchedulerResult<Job> {
        let mut state = self.state.write().await;
        match outcome {
            JobOutcome::Succeeded { result_ref } => {
                state.apply(job_id, JobStatus::Succeeded, Some(100.0), Some(Detail::Result(result_ref)))
            }
            JobOutcome::Failed { reason } => {
                state.apply(job_id, JobStatus::Failed, None, Some(Detail::Reason(reason)))
            }
        }
    }

    /// Cancel a PENDING job owned by `user_id` and drop it from its branch queue
    pub async fn cancel_job(&self, job_id: &JobId, user_id: &str) -> SchedulerResult<Job> {
        let mut state = self.state.write().await;
        match state.jobs.get(job_id) {
            Some(job) if job.user_id == user_id => {}
            _ => return Err(SchedulerError::NotFound(format!("job {job_id}"))),
        }
        let job = state.apply(job_id, JobStatus::Cancelled, None, None)?;
        tracing::info!("🛑 Cancelled job {} on branch {}", job.job_id, job.branch);
        Ok(job)
    }

    /// Promote every job admission allows, committing each before the next decision
    ///
    /// The whole evaluate-and-commit sequence runs under one write lock.
    pub async fn admit_ready(&self, limits: &AdmissionLimits) -> Vec<Job> {
        let mut state = self.state.write().await;
        let mut admitted = Vec::new();
        while let Some(job) = state.admit_next(limits) {
            admitted.push(job);
        }
        admitted
    }

    /// Current running/pending counters
    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        StoreStats {
            running: state.running,
            active_users: state.active_users.len(),
            pending: state.queues.len(),
            busy_branches: state.running_branches.len(),
            workflows: self.workflows.load().len(),
        }
    }
}

/// Terminal payload accompanying a status write
enum Detail {
    Result(ResultRef),
    Reason(String),
}

impl StoreState {
    fn member_jobs(&self, workflow: &Workflow) -> Vec<Job> {
        workflow
            .job_ids
            .iter()
            .filter_map(|id| self.jobs.get(id).cloned())
            .collect()
    }

    fn apply(
        &mut self,
        job_id: &JobId,
        status: JobStatus,
        progress: Option<f64>,
        detail: Option<Detail>,
    ) -> SchedulerResult<Job> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::NotFound(format!("job {job_id}")))?;

        if job.status == JobStatus::Running && status == JobStatus::Running {
            if let Some(progress) = progress {
                job.progress = job.progress.max(progress.clamp(0.0, 100.0));
            }
            return Ok(job.clone());
        }
        if status == JobStatus::Running {
            return Err(invalid_state(job, "jobs enter RUNNING only through admission"));
        }
        if !job.status.can_transition_to(status) {
            let reason = match status {
                JobStatus::Cancelled => "only PENDING jobs can be cancelled",
                _ => "illegal status transition",
            };
            return Err(invalid_state(job, reason));
        }

        let now = Utc::now();
        job.status = status;
        job.finished_at = Some(now);
        match status {
            JobStatus::Cancelled => {
                self.queues.remove(&job.branch, job_id);
            }
            JobStatus::Succeeded => {
                job.progress = 100.0;
                if let Some(Detail::Result(result_ref)) = detail {
                    job.result_ref = Some(result_ref);
                }
            }
            JobStatus::Failed => {
                if let Some(progress) = progress {
                    job.progress = job.progress.max(progress.clamp(0.0, 100.0));
                }
                if let Some(Detail::Reason(reason)) = detail {
                    job.error_message = Some(reason);
                }
            }
            JobStatus::Pending | JobStatus::Running => {}
        }

        let job = job.clone();
        if matches!(status, JobStatus::Succeeded | JobStatus::Failed) {
            self.release(&job);
        }
        Ok(job)
    }

    /// Drop a finished job from the running indices
    fn release(&mut self, job: &Job) {
        if self.running_branches.get(&job.branch) == Some(&job.job_id) {
            self.running_branches.remove(&job.branch);
        }
        if let Some(count) = self.active_users.get_mut(&job.user_id) {
            *count -= 1;
            if *count == 0 {
                self.active_users.remove(&job.user_id);
            }
        }
        self.running = self.running.saturating_sub(1);
    }

    /// Evaluate admission once and commit the winner
    fn admit_next(&mut self, limits: &AdmissionLimits) -> Option<Job> {
        self.drop_stale_heads();

        let chosen = {
            let candidates = self.queues.heads().filter_map(|(branch, job_id)| {
                let job = self.jobs.get(job_id)?;
                Some(Candidate {
                    job_id,
                    branch,
                    user_id: &job.user_id,
                    created_at: job.created_at,
                    seq: job.seq,
                })
            });
            let snapshot = AdmissionSnapshot {
                running: self.running,
                busy_branches: &self.running_branches,
                active_users: &self.active_users,
            };
            admission::select_candidate(candidates, &snapshot, limits)
                .map(|candidate| (candidate.branch.to_string(), candidate.job_id.clone()))
        };
        let (branch, job_id) = chosen?;

        self.queues.pop_head(&branch);
        let job = self.jobs.get_mut(&job_id)?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.progress = 0.0;
        let job = job.clone();

        self.running_branches.insert(branch, job_id);
        *self.active_users.entry(job.user_id.clone()).or_insert(0) += 1;
        self.running += 1;
        Some(job)
    }

    /// Pop heads that are no longer PENDING jobs
    fn drop_stale_heads(&mut self) {
        let stale: Vec<String> = self
            .queues
            .heads()
            .filter(|(_, job_id)| {
                self.jobs
                    .get(*job_id)
                    .is_none_or(|job| job.status != JobStatus::Pending)
            })
            .map(|(branch, _)| branch.to_string())
            .collect();
        for branch in stale {
            if let Some(job_id) = self.queues.pop_head(&branch) {
                tracing::warn!("🧹 Dropped stale queue entry {} on branch {}", job_id, branch);
            }
        }
    }
}

fn invalid_state(job: &Job, reason: &str) -> SchedulerError {
    SchedulerError::InvalidState {
        job_id: job.job_id.to_string(),
        status: job.status,
        reason: reason.to_string(),
    }
}

fn owns_any(jobs: &[Job], user_id: &str) -> bool {
    jobs.iter().any(|job| job.user_id == user_id)
}

fn validate_submission(user_id: &str, specs: &[JobSpec]) -> SchedulerResult<()> {
    if user_id.trim().is_empty() {
        return Err(SchedulerError::Validation("user_id is required".to_string()));
    }
    if specs.is_empty() {
        return Err(SchedulerError::Validation("workflow must contain at least one job".to_string()));
    }
    for (index, spec) in specs.iter().enumerate() {
        if spec.branch.trim().is_empty() {
            return Err(SchedulerError::Validation(format!("jobs[{index}].branch is required")));
        }
        if spec.wsi_path.trim().is_empty() {
            return Err(SchedulerError::Validation(format!("jobs[{index}].wsi_path is required")));
        }
    }
    Ok(())
}

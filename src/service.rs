/// Workflow service: the interface the transport layer talks to
///
/// Wires the entity store, tile pipeline, worker pool and scheduler loop
/// together and exposes tenant-scoped submission, lookup and cancellation.
/// Every state change that can free or create admission work wakes the
/// scheduler.

use crate::{
    capability::Capabilities,
    config::Config,
    error::SchedulerResult,
    runtime::{
        admission::AdmissionLimits,
        pipeline::TilePipeline,
        pool::WorkerPool,
        scheduler::{self, SchedulerEvent, SchedulerHandle, SchedulerLoop},
    },
    workflow::{
        store::{EntityStore, StoreStats},
        types::{Job, JobId, JobSpec, WorkflowId, WorkflowProgress, WorkflowView},
    },
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<EntityStore>,
    scheduler: SchedulerHandle,
}

impl WorkflowService {
    /// Build the runtime and start the scheduler loop in the background
    ///
    /// The loop stops when `token` is cancelled; running jobs finish on their own.
    pub fn start(config: &Config, capabilities: Capabilities, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let store = Arc::new(EntityStore::new());
        let (handle, events) = scheduler::channel(config.scheduler.event_capacity);

        let pipeline = Arc::new(TilePipeline::new(
            config.pipeline.clone(),
            capabilities,
            Arc::clone(&store),
        ));
        let pool = WorkerPool::new(
            config.scheduler.max_workers,
            pipeline,
            Arc::clone(&store),
            handle.clone(),
        );
        let scheduler_loop = SchedulerLoop::new(
            Arc::clone(&store),
            pool,
            AdmissionLimits::from(&config.scheduler),
            config.scheduler.tick_interval,
            events,
        );
        let join = scheduler_loop.spawn(token);

        (
            Self {
                store,
                scheduler: handle,
            },
            join,
        )
    }

    /// Register a workflow for `user_id`; all jobs start PENDING
    pub async fn submit_workflow(&self, user_id: &str, jobs: Vec<JobSpec>) -> SchedulerResult<WorkflowView> {
        let view = self.store.create_workflow(user_id, jobs).await?;
        self.scheduler
            .notify(SchedulerEvent::WorkflowSubmitted(view.workflow_id.clone()));
        Ok(view)
    }

    pub async fn list_workflows(&self, user_id: &str) -> Vec<WorkflowView> {
        self.store.list_workflows(user_id).await
    }

    pub async fn get_workflow(&self, workflow_id: &WorkflowId, user_id: &str) -> SchedulerResult<WorkflowView> {
        self.store.get_workflow(workflow_id, user_id).await
    }

    /// Aggregate progress plus per-job status lines
    pub async fn get_workflow_progress(
        &self,
        workflow_id: &WorkflowId,
        user_id: &str,
    ) -> SchedulerResult<WorkflowProgress> {
        let view = self.store.get_workflow(workflow_id, user_id).await?;
        Ok(WorkflowProgress::from(&view))
    }

    pub async fn get_job(&self, job_id: &JobId, user_id: &str) -> SchedulerResult<Job> {
        self.store.get_job(job_id, user_id).await
    }

    /// Cancel a PENDING job; anything else is an `InvalidState` error
    pub async fn cancel_job(&self, job_id: &JobId, user_id: &str) -> SchedulerResult<Job> {
        let job = self.store.cancel_job(job_id, user_id).await?;
        self.scheduler
            .notify(SchedulerEvent::JobCancelled(job.job_id.clone()));
        Ok(job)
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.stats().await
    }
}

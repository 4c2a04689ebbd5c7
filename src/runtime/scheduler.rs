/// Scheduler control loop
///
/// A single task owns admission: it wakes on submission, cancellation and job
/// completion events (plus a periodic safety-net tick), promotes every job the
/// admission policy allows and hands each one to the worker pool without
/// waiting for it.

use crate::{
    runtime::{admission::AdmissionLimits, pool::WorkerPool},
    workflow::{
        store::EntityStore,
        types::{JobId, JobStatus, WorkflowId},
    },
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

/// Reasons to re-run admission
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    WorkflowSubmitted(WorkflowId),
    JobCancelled(JobId),
    JobFinished { job_id: JobId, status: JobStatus },
}

/// Cheap, cloneable wake-up handle for the scheduler loop
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    /// Queue a wake event without blocking
    ///
    /// A full channel already guarantees a pending wake, so the event is dropped.
    pub fn notify(&self, event: SchedulerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!("Scheduler wake queue full, coalescing {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!("Scheduler stopped, dropping {:?}", event);
            }
        }
    }
}

/// Create the wake channel shared by the service, the pool and the loop
pub fn channel(capacity: usize) -> (SchedulerHandle, mpsc::Receiver<SchedulerEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SchedulerHandle { tx }, rx)
}

pub struct SchedulerLoop {
    store: Arc<EntityStore>,
    pool: WorkerPool,
    limits: AdmissionLimits,
    tick_interval: Duration,
    events: mpsc::Receiver<SchedulerEvent>,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<EntityStore>,
        pool: WorkerPool,
        limits: AdmissionLimits,
        tick_interval: Duration,
        events: mpsc::Receiver<SchedulerEvent>,
    ) -> Self {
        Self {
            store,
            pool,
            limits,
            tick_interval,
            events,
        }
    }

    /// Run the loop on a background task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    pub async fn run(mut self, token: CancellationToken) {
        tracing::info!(
            "⏰ Scheduler loop started (max running: {}, max active users: {}, tick: {:?})",
            self.limits.max_running,
            self.limits.max_active_users,
            self.tick_interval
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,

                event = self.events.recv() => match event {
                    Some(event) => {
                        tracing::debug!("🔔 Scheduler woken by {:?}", event);
                        self.coalesce_pending();
                        self.dispatch().await;
                    }
                    None => break,
                },

                _ = tick.tick() => {
                    let admitted = self.dispatch().await;
                    if admitted > 0 {
                        tracing::debug!("⏰ Tick admitted {} jobs missed by wake events", admitted);
                    }
                }
            }
        }

        tracing::info!("⏹️ Scheduler loop stopped");
    }

    /// Drain queued wake events; one admission pass covers them all
    fn coalesce_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            tracing::debug!("🔔 Coalesced {:?}", event);
        }
    }

    /// Admit everything currently eligible and hand it to the pool
    ///
    /// Returns the number of jobs dispatched.
    pub async fn dispatch(&self) -> usize {
        let admitted = self.store.admit_ready(&self.limits).await;
        let count = admitted.len();

        for job in admitted {
            tracing::info!(
                "🚀 Dispatching job {} (branch: {}, user: {}, type: {:?})",
                job.job_id,
                job.branch,
                job.user_id,
                job.job_type
            );
            self.pool.submit(job);
        }

        if count > 0 {
            let stats = self.store.stats().await;
            tracing::debug!(
                "📊 Running {}/{} jobs for {} users, {} pending, {}/{} worker slots free",
                stats.running,
                self.limits.max_running,
                stats.active_users,
                stats.pending,
                self.pool.available(),
                self.pool.capacity()
            );
        }
        count
    }
}

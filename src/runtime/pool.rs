/// Bounded worker pool running tile pipelines for admitted jobs
///
/// `submit` is fire-and-forget: the scheduler loop never waits on pipeline
/// work. Every outcome, including a panicking pipeline, is converted into a
/// terminal job status before the scheduler is woken to reuse the slot.

use crate::{
    error::PipelineError,
    runtime::{pipeline::TilePipeline, scheduler::{SchedulerEvent, SchedulerHandle}},
    workflow::{
        store::{EntityStore, JobOutcome},
        types::Job,
    },
};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    pipeline: Arc<TilePipeline>,
    store: Arc<EntityStore>,
    scheduler: SchedulerHandle,
}

impl WorkerPool {
    pub fn new(
        capacity: usize,
        pipeline: Arc<TilePipeline>,
        store: Arc<EntityStore>,
        scheduler: SchedulerHandle,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            pipeline,
            store,
            scheduler,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently executing a job
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Start a RUNNING job on a free slot
    pub fn submit(&self, job: Job) {
        let slots = Arc::clone(&self.slots);
        let pipeline = Arc::clone(&self.pipeline);
        let store = Arc::clone(&self.store);
        let scheduler = self.scheduler.clone();

        tokio::spawn(async move {
            let outcome = match slots.acquire_owned().await {
                Ok(_permit) => execute(pipeline, job.clone()).await,
                Err(_) => JobOutcome::Failed {
                    reason: PipelineError::Worker("worker pool closed".to_string()).to_string(),
                },
            };

            match &outcome {
                JobOutcome::Succeeded { result_ref } => {
                    tracing::info!("✅ Job {} succeeded: {}", job.job_id, result_ref.0);
                }
                JobOutcome::Failed { reason } => {
                    tracing::error!("❌ Job {} failed: {}", job.job_id, reason);
                }
            }

            match store.complete_job(&job.job_id, outcome).await {
                Ok(done) => scheduler.notify(SchedulerEvent::JobFinished {
                    job_id: done.job_id,
                    status: done.status,
                }),
                Err(e) => tracing::error!("❌ Failed to record outcome for job {}: {}", job.job_id, e),
            }
        });
    }
}

/// Run the pipeline on its own task so a panic surfaces as a join error
async fn execute(pipeline: Arc<TilePipeline>, job: Job) -> JobOutcome {
    let job_id = job.job_id.clone();
    let handle = tokio::spawn(async move { pipeline.run(&job).await });

    match handle.await {
        Ok(Ok(result_ref)) => JobOutcome::Succeeded { result_ref },
        Ok(Err(error)) => JobOutcome::Failed {
            reason: error.to_string(),
        },
        Err(join_error) => {
            let cause = if join_error.is_panic() {
                "worker panicked"
            } else {
                "worker task aborted"
            };
            tracing::error!("💥 Pipeline task for job {} died: {}", job_id, join_error);
            JobOutcome::Failed {
                reason: PipelineError::Worker(cause.to_string()).to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{Capabilities, CellSegmenter, ResultExporter, Slide, SlideSource},
        config::PipelineConfig,
        runtime::{admission::AdmissionLimits, result::{JobArtifact, Polygon}, scheduler},
        workflow::types::{JobSpec, JobStatus, JobType, ResultRef},
    };
    use async_trait::async_trait;
    use image::RgbImage;
    use std::time::Duration;

    struct PanickingSlides;

    #[async_trait]
    impl SlideSource for PanickingSlides {
        async fn open(&self, _path: &str) -> Result<Arc<dyn Slide>, PipelineError> {
            panic!("decoder exploded");
        }
    }

    struct Unused;

    #[async_trait]
    impl CellSegmenter for Unused {
        async fn segment(&self, _tile: Arc<RgbImage>) -> Result<Vec<Polygon>, PipelineError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ResultExporter for Unused {
        async fn export(&self, artifact: &JobArtifact) -> Result<ResultRef, PipelineError> {
            Ok(ResultRef(artifact.job_id.to_string()))
        }
    }

    #[tokio::test]
    async fn panicking_pipeline_fails_the_job_and_wakes_scheduler() {
        let store = Arc::new(EntityStore::new());
        let (handle, mut events) = scheduler::channel(8);
        let pipeline = Arc::new(TilePipeline::new(
            PipelineConfig::default(),
            Capabilities {
                slides: Arc::new(PanickingSlides),
                segmenter: Arc::new(Unused),
                exporter: Arc::new(Unused),
            },
            store.clone(),
        ));
        let pool = WorkerPool::new(4, pipeline, store.clone(), handle);

        store
            .create_workflow("u1", vec![JobSpec::new("b", JobType::TissueMask, "/x.tiff")])
            .await
            .unwrap();
        let job = store.admit_ready(&AdmissionLimits::default()).await.remove(0);
        pool.submit(job.clone());

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SchedulerEvent::JobFinished { status: JobStatus::Failed, .. }));

        let failed = store.get_job(&job.job_id, "u1").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("worker failure: worker panicked"));
        assert_eq!(store.stats().await.running, 0);
        assert_eq!(pool.available(), pool.capacity());
    }
}

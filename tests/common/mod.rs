#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use slidequeue::{
    capability::{Capabilities, CellSegmenter, ResultExporter, Slide, SlideSource},
    config::{Config, ExportConfig, PipelineConfig, SchedulerConfig, ServerConfig},
    runtime::{
        result::{JobArtifact, Polygon},
        tiles::TileRegion,
    },
    workflow::{store::StoreStats, types::ResultRef},
    Job, JobId, JobStatus, PipelineError, WorkflowService,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub const TILE: u32 = 8;

/// Small tiles and a fast tick so scenarios settle quickly
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        scheduler: SchedulerConfig {
            tick_interval: Duration::from_millis(10),
            ..SchedulerConfig::default()
        },
        pipeline: PipelineConfig {
            tile_size: TILE,
            tile_overlap: 0,
            ..PipelineConfig::default()
        },
        export: ExportConfig::default(),
    }
}

/// Fully dark in-memory slide
pub struct MemorySlide {
    image: RgbImage,
}

#[async_trait]
impl Slide for MemorySlide {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    async fn read_region(&self, region: TileRegion) -> Result<RgbImage, PipelineError> {
        Ok(image::imageops::crop_imm(&self.image, region.x, region.y, region.width, region.height).to_image())
    }
}

/// Slide source whose `open` blocks until the test releases that path
///
/// Paths starting with `missing` fail to open. Paths starting with `free` never block.
#[derive(Default)]
pub struct GatedSlides {
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    opened: Mutex<Vec<String>>,
    /// Width in tiles of every opened slide
    tiles_wide: u32,
}

impl GatedSlides {
    pub fn new(tiles_wide: u32) -> Self {
        Self {
            tiles_wide: tiles_wide.max(1),
            ..Self::default()
        }
    }

    fn gate(&self, path: &str) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().unwrap();
        gates
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    pub fn release(&self, path: &str) {
        self.gate(path).add_permits(1);
    }

    /// Paths in the order workers opened them
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlideSource for GatedSlides {
    async fn open(&self, path: &str) -> Result<Arc<dyn Slide>, PipelineError> {
        self.opened.lock().unwrap().push(path.to_string());

        if path.starts_with("missing") {
            return Err(PipelineError::ImageOpen {
                path: path.to_string(),
                reason: "no such file".to_string(),
            });
        }
        if !path.starts_with("free") {
            let gate = self.gate(path);
            gate.acquire()
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?
                .forget();
        }

        Ok(Arc::new(MemorySlide {
            image: RgbImage::from_pixel(TILE * self.tiles_wide, TILE, Rgb([20, 20, 20])),
        }))
    }
}

/// One polygon per tile; the first `fail_first` calls fail
#[derive(Default)]
pub struct CountingSegmenter {
    fail_first: usize,
    calls: AtomicUsize,
}

impl CountingSegmenter {
    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CellSegmenter for CountingSegmenter {
    async fn segment(&self, _tile: Arc<RgbImage>) -> Result<Vec<Polygon>, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(PipelineError::Inference(format!("simulated failure {call}")));
        }
        Ok(vec![Polygon {
            points: vec![[0, 0], [1, 0], [1, 1]],
        }])
    }
}

/// Keeps exported artifacts in memory
#[derive(Default)]
pub struct MemoryExporter {
    artifacts: Mutex<Vec<JobArtifact>>,
}

impl MemoryExporter {
    pub fn artifacts(&self) -> Vec<JobArtifact> {
        self.artifacts.lock().unwrap().clone()
    }

    pub fn artifact_for(&self, job_id: &JobId) -> Option<JobArtifact> {
        self.artifacts().into_iter().find(|artifact| &artifact.job_id == job_id)
    }
}

#[async_trait]
impl ResultExporter for MemoryExporter {
    async fn export(&self, artifact: &JobArtifact) -> Result<ResultRef, PipelineError> {
        self.artifacts.lock().unwrap().push(artifact.clone());
        Ok(ResultRef(format!("memory://{}", artifact.job_id)))
    }
}

pub struct Harness {
    pub service: WorkflowService,
    pub slides: Arc<GatedSlides>,
    pub exporter: Arc<MemoryExporter>,
    pub token: CancellationToken,
}

impl Harness {
    pub fn start() -> Self {
        Self::with(GatedSlides::new(1), CountingSegmenter::default())
    }

    pub fn with(slides: GatedSlides, segmenter: CountingSegmenter) -> Self {
        let slides = Arc::new(slides);
        let exporter = Arc::new(MemoryExporter::default());
        let capabilities = Capabilities {
            slides: slides.clone(),
            segmenter: Arc::new(segmenter),
            exporter: exporter.clone(),
        };
        let token = CancellationToken::new();
        let (service, _loop) = WorkflowService::start(&test_config(), capabilities, token.clone());
        Self {
            service,
            slides,
            exporter,
            token,
        }
    }

    pub async fn job(&self, job_id: &JobId, user: &str) -> Job {
        self.service.get_job(job_id, user).await.unwrap()
    }

    /// Poll until the job reaches `status`
    pub async fn wait_for(&self, job_id: &JobId, user: &str, status: JobStatus) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.job(job_id, user).await;
            if job.status == status {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} stuck in {} waiting for {}",
                job_id,
                job.status,
                status
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until the store reports `running` RUNNING jobs
    pub async fn wait_for_running(&self, running: usize) -> StoreStats {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = self.service.stats().await;
            if stats.running == running {
                return stats;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} running, store reports {:?}",
                running,
                stats
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Let the scheduler run a few more ticks
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Samples store counters in the background and keeps the peaks
pub struct InvariantMonitor {
    peaks: Arc<Mutex<StoreStats>>,
    violations: Arc<Mutex<Vec<StoreStats>>>,
    token: CancellationToken,
}

impl InvariantMonitor {
    pub fn spawn(service: WorkflowService) -> Self {
        let peaks = Arc::new(Mutex::new(StoreStats::default()));
        let violations = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();

        let (peaks_task, violations_task, stop) = (peaks.clone(), violations.clone(), token.clone());
        tokio::spawn(async move {
            while !stop.is_cancelled() {
                let stats = service.stats().await;
                {
                    let mut peaks = peaks_task.lock().unwrap();
                    peaks.running = peaks.running.max(stats.running);
                    peaks.active_users = peaks.active_users.max(stats.active_users);
                }
                if stats.running > 4 || stats.active_users > 3 || stats.busy_branches != stats.running {
                    violations_task.lock().unwrap().push(stats);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        Self {
            peaks,
            violations,
            token,
        }
    }

    pub fn finish(self) -> (StoreStats, Vec<StoreStats>) {
        self.token.cancel();
        let peaks = self.peaks.lock().unwrap().clone();
        let violations = self.violations.lock().unwrap().clone();
        (peaks, violations)
    }
}

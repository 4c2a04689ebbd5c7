/// Tile pipeline: one job in, one exported aggregate out
///
/// Opens the slide, walks the tile grid with bounded concurrency, filters
/// background tiles, runs per-tile analysis in isolation and streams progress
/// into the entity store after every tile.

use crate::{
    capability::{Capabilities, CellSegmenter, ResultExporter, Slide, SlideSource},
    config::PipelineConfig,
    error::PipelineError,
    runtime::{
        result::{Aggregate, TileContribution, TileMaskSummary, TileStats},
        tiles::{tissue_fraction, TileGrid, TileRegion},
    },
    workflow::{
        store::EntityStore,
        types::{Job, JobType, ResultRef},
    },
};
use futures::stream::{self, StreamExt};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Pixel stride used for the cheap background estimate
const ESTIMATE_STRIDE: u32 = 4;

/// Result of one tile computation
#[derive(Debug)]
enum TileOutcome {
    /// Below the tissue threshold; tissue masks still record the tile
    Skipped(Option<TileContribution>),
    Completed(TileContribution),
    Failed { region: TileRegion, error: PipelineError },
}

/// Completed-tile counter for one job
#[derive(Debug)]
pub struct ProgressTracker {
    done: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Count one finished tile and return the new percentage
    pub fn advance(&self) -> f64 {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        Self::percent(done, self.total)
    }

    #[cfg(test)]
    pub fn current(&self) -> f64 {
        Self::percent(self.done.load(Ordering::Acquire), self.total)
    }

    fn percent(done: usize, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        (done.min(total) as f64 / total as f64) * 100.0
    }
}

/// Executes jobs against the configured collaborators
pub struct TilePipeline {
    config: PipelineConfig,
    slides: Arc<dyn SlideSource>,
    segmenter: Arc<dyn CellSegmenter>,
    exporter: Arc<dyn ResultExporter>,
    store: Arc<EntityStore>,
}

impl TilePipeline {
    pub fn new(config: PipelineConfig, capabilities: Capabilities, store: Arc<EntityStore>) -> Self {
        Self {
            config,
            slides: capabilities.slides,
            segmenter: capabilities.segmenter,
            exporter: capabilities.exporter,
            store,
        }
    }

    /// Run a job to its exported result
    ///
    /// An unopenable slide fails before any tile is touched. Individual tile
    /// failures are absorbed unless they exceed `max_tile_failure_ratio` of the
    /// tiles that passed the background filter.
    pub async fn run(&self, job: &Job) -> Result<ResultRef, PipelineError> {
        let start = std::time::Instant::now();
        let slide = self.slides.open(&job.wsi_path).await?;
        let (width, height) = slide.dimensions();

        let grid = TileGrid::new(width, height, self.config.tile_size, self.config.tile_overlap);
        let tracker = ProgressTracker::new(grid.len());
        let mut stats = TileStats {
            total: grid.len(),
            ..TileStats::default()
        };
        let mut aggregate = Aggregate::for_job_type(job.job_type);

        tracing::info!(
            "🧩 Job {} ({:?}): {}x{} slide, {} tiles",
            job.job_id,
            job.job_type,
            width,
            height,
            stats.total
        );

        let slide = slide.as_ref();
        let mut outcomes = stream::iter(grid.tiles())
            .map(|region| self.process_tile(job.job_type, slide, region))
            .buffer_unordered(self.config.tile_concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                TileOutcome::Skipped(contribution) => {
                    stats.skipped += 1;
                    if let Some(contribution) = contribution {
                        aggregate.absorb(contribution);
                    }
                }
                TileOutcome::Completed(contribution) => {
                    stats.processed += 1;
                    aggregate.absorb(contribution);
                }
                TileOutcome::Failed { region, error } => {
                    stats.failed += 1;
                    tracing::warn!(
                        "⚠️ Job {}: tile ({}, {}) failed: {}",
                        job.job_id,
                        region.x,
                        region.y,
                        error
                    );
                }
            }

            let progress = tracker.advance();
            if let Err(e) = self.store.record_progress(&job.job_id, progress).await {
                tracing::debug!("Progress write for job {} rejected: {}", job.job_id, e);
            }
        }
        drop(outcomes);

        let attempted = stats.attempted();
        if attempted > 0 && stats.failed as f64 / attempted as f64 > self.config.max_tile_failure_ratio {
            return Err(PipelineError::TooManyTileFailures {
                failed: stats.failed,
                attempted,
            });
        }

        tracing::info!(
            "📊 Job {} tiles: {} processed, {} skipped, {} failed in {:?}",
            job.job_id,
            stats.processed,
            stats.skipped,
            stats.failed,
            start.elapsed()
        );

        let artifact = aggregate.finish(job.job_id.clone(), job.job_type, stats);
        self.exporter.export(&artifact).await
    }

    /// Read, filter and analyse one tile; never propagates an error
    async fn process_tile(&self, job_type: JobType, slide: &dyn Slide, region: TileRegion) -> TileOutcome {
        let tile = match slide.read_region(region).await {
            Ok(tile) => tile,
            Err(error) => return TileOutcome::Failed { region, error },
        };

        let estimate = tissue_fraction(&tile, self.config.background_level, ESTIMATE_STRIDE);
        if estimate < self.config.tissue_threshold {
            tracing::debug!("⏭️ Background tile ({}, {}): tissue {:.3}", region.x, region.y, estimate);
            let contribution = match job_type {
                JobType::CellSegmentation => None,
                JobType::TissueMask => Some(TileContribution::Mask(TileMaskSummary::new(region, estimate, true))),
            };
            return TileOutcome::Skipped(contribution);
        }

        match job_type {
            JobType::CellSegmentation => match self.segmenter.segment(Arc::new(tile)).await {
                Ok(polygons) => TileOutcome::Completed(TileContribution::Cells {
                    region,
                    polygons: polygons
                        .into_iter()
                        .map(|polygon| polygon.translated(region.x, region.y))
                        .collect(),
                }),
                Err(error) => TileOutcome::Failed { region, error },
            },
            JobType::TissueMask => {
                let mask_mean = tissue_fraction(&tile, self.config.background_level, 1);
                TileOutcome::Completed(TileContribution::Mask(TileMaskSummary::new(region, mask_mean, false)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::image_file::DecodedSlide;
    use crate::runtime::admission::AdmissionLimits;
    use crate::runtime::result::{JobArtifact, Polygon};
    use crate::workflow::types::{JobSpec, JobStatus};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Serves one in-memory image for every path
    struct MemorySlides(Arc<RgbImage>);

    #[async_trait]
    impl SlideSource for MemorySlides {
        async fn open(&self, _path: &str) -> Result<Arc<dyn Slide>, PipelineError> {
            Ok(Arc::new(DecodedSlide::new((*self.0).clone())))
        }
    }

    struct NoSlides;

    #[async_trait]
    impl SlideSource for NoSlides {
        async fn open(&self, path: &str) -> Result<Arc<dyn Slide>, PipelineError> {
            Err(PipelineError::ImageOpen {
                path: path.to_string(),
                reason: "unreadable".to_string(),
            })
        }
    }

    /// One polygon per tile; fails on the configured tile count
    struct FlakySegmenter {
        fail_first: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CellSegmenter for FlakySegmenter {
        async fn segment(&self, _tile: Arc<RgbImage>) -> Result<Vec<Polygon>, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(PipelineError::Inference("simulated".to_string()));
            }
            Ok(vec![Polygon { points: vec![[0, 0]] }])
        }
    }

    #[derive(Default)]
    struct CapturingExporter(Mutex<Vec<JobArtifact>>);

    #[async_trait]
    impl ResultExporter for CapturingExporter {
        async fn export(&self, artifact: &JobArtifact) -> Result<ResultRef, PipelineError> {
            self.0.lock().unwrap().push(artifact.clone());
            Ok(ResultRef(format!("mem://{}", artifact.job_id)))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            tile_size: 10,
            tile_overlap: 0,
            ..PipelineConfig::default()
        }
    }

    /// 50x40 slide: top two tile rows are tissue (10 tiles), bottom two background
    fn slide() -> Arc<RgbImage> {
        let mut img = RgbImage::from_pixel(50, 40, Rgb([250, 250, 250]));
        for y in 0..20 {
            for x in 0..50 {
                img.put_pixel(x, y, Rgb([120, 70, 150]));
            }
        }
        Arc::new(img)
    }

    async fn running_job(store: &EntityStore, job_type: JobType) -> Job {
        store
            .create_workflow("u1", vec![JobSpec::new("b", job_type, "/slides/a.tiff")])
            .await
            .unwrap();
        store.admit_ready(&AdmissionLimits::default()).await.remove(0)
    }

    #[tokio::test]
    async fn tile_failures_are_isolated() {
        let store = Arc::new(EntityStore::new());
        let exporter = Arc::new(CapturingExporter::default());
        let pipeline = TilePipeline::new(
            config(),
            Capabilities {
                slides: Arc::new(MemorySlides(slide())),
                segmenter: Arc::new(FlakySegmenter { fail_first: 2, calls: AtomicUsize::new(0) }),
                exporter: exporter.clone(),
            },
            store.clone(),
        );
        let job = running_job(&store, JobType::CellSegmentation).await;

        let result_ref = pipeline.run(&job).await.unwrap();
        assert_eq!(result_ref.0, format!("mem://{}", job.job_id));

        let artifact = exporter.0.lock().unwrap()[0].clone();
        assert_eq!(
            artifact.stats,
            TileStats { total: 20, processed: 8, skipped: 10, failed: 2 }
        );
        match &artifact.body {
            crate::runtime::result::ArtifactBody::CellSegmentation { polygons } => assert_eq!(polygons.len(), 8),
            other => panic!("unexpected body {other:?}"),
        }

        let live = store.get_job(&job.job_id, "u1").await.unwrap();
        assert_eq!(live.status, JobStatus::Running);
        assert_eq!(live.progress, 100.0);
    }

    #[tokio::test]
    async fn too_many_failures_fail_the_job() {
        let store = Arc::new(EntityStore::new());
        let pipeline = TilePipeline::new(
            config(),
            Capabilities {
                slides: Arc::new(MemorySlides(slide())),
                segmenter: Arc::new(FlakySegmenter { fail_first: 6, calls: AtomicUsize::new(0) }),
                exporter: Arc::new(CapturingExporter::default()),
            },
            store.clone(),
        );
        let job = running_job(&store, JobType::CellSegmentation).await;

        let err = pipeline.run(&job).await.unwrap_err();
        assert_eq!(err, PipelineError::TooManyTileFailures { failed: 6, attempted: 10 });
    }

    #[tokio::test]
    async fn open_failure_touches_no_tiles() {
        let store = Arc::new(EntityStore::new());
        let exporter = Arc::new(CapturingExporter::default());
        let pipeline = TilePipeline::new(
            config(),
            Capabilities {
                slides: Arc::new(NoSlides),
                segmenter: Arc::new(FlakySegmenter { fail_first: 0, calls: AtomicUsize::new(0) }),
                exporter: exporter.clone(),
            },
            store.clone(),
        );
        let job = running_job(&store, JobType::CellSegmentation).await;

        let err = pipeline.run(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::ImageOpen { .. }));
        assert!(exporter.0.lock().unwrap().is_empty());
        assert_eq!(store.get_job(&job.job_id, "u1").await.unwrap().progress, 0.0);
    }

    #[tokio::test]
    async fn tissue_mask_lists_every_tile() {
        let store = Arc::new(EntityStore::new());
        let exporter = Arc::new(CapturingExporter::default());
        let pipeline = TilePipeline::new(
            config(),
            Capabilities {
                slides: Arc::new(MemorySlides(slide())),
                segmenter: Arc::new(FlakySegmenter { fail_first: 0, calls: AtomicUsize::new(0) }),
                exporter: exporter.clone(),
            },
            store.clone(),
        );
        let job = running_job(&store, JobType::TissueMask).await;

        pipeline.run(&job).await.unwrap();
        let artifact = exporter.0.lock().unwrap()[0].clone();
        match &artifact.body {
            crate::runtime::result::ArtifactBody::TissueMask { tiles } => {
                assert_eq!(tiles.len(), 20);
                assert_eq!(tiles.iter().filter(|t| t.background).count(), 10);
                assert_eq!(tiles[0].mask_mean, 1.0);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn tracker_reports_percentages() {
        let tracker = ProgressTracker::new(4);
        assert_eq!(tracker.current(), 0.0);
        assert_eq!(tracker.advance(), 25.0);
        tracker.advance();
        assert_eq!(tracker.current(), 50.0);
        assert_eq!(ProgressTracker::new(0).current(), 100.0);
    }
}

/// External collaborator capabilities consumed by the tile pipeline
///
/// The pipeline only talks to these traits:
/// - SlideSource / Slide: open an image by path, read regions of it
/// - CellSegmenter: tile bitmap to detected polygons, may fail per call
/// - ResultExporter: persist the aggregate result keyed by job id
///
/// Default implementations decode ordinary raster files with the `image` crate,
/// segment with a threshold/connected-component detector and write JSON files.

use crate::{
    config::Config,
    error::PipelineError,
    runtime::{
        result::{JobArtifact, Polygon},
        tiles::TileRegion,
    },
    workflow::types::ResultRef,
};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

// Raster file slide source
pub mod image_file;

// Threshold-based stand-in for the cell segmentation model
pub mod segmenter;

// JSON file result export
pub mod export;

pub use export::JsonFileExporter;
pub use image_file::ImageFileSource;
pub use segmenter::ThresholdSegmenter;

/// Opens slides by path
#[async_trait]
pub trait SlideSource: Send + Sync {
    async fn open(&self, path: &str) -> Result<Arc<dyn Slide>, PipelineError>;
}

/// An opened slide
#[async_trait]
pub trait Slide: Send + Sync {
    /// (width, height) in slide pixels
    fn dimensions(&self) -> (u32, u32);

    /// Read one region as RGB
    async fn read_region(&self, region: TileRegion) -> Result<RgbImage, PipelineError>;
}

/// Detects cells in one tile; polygons are in tile-local coordinates
#[async_trait]
pub trait CellSegmenter: Send + Sync {
    async fn segment(&self, tile: Arc<RgbImage>) -> Result<Vec<Polygon>, PipelineError>;
}

/// Persists a finished job's aggregate
#[async_trait]
pub trait ResultExporter: Send + Sync {
    async fn export(&self, artifact: &JobArtifact) -> Result<ResultRef, PipelineError>;
}

/// The full set of collaborators a pipeline is built from
#[derive(Clone)]
pub struct Capabilities {
    pub slides: Arc<dyn SlideSource>,
    pub segmenter: Arc<dyn CellSegmenter>,
    pub exporter: Arc<dyn ResultExporter>,
}

impl Capabilities {
    /// Default file-backed collaborators
    pub fn from_config(config: &Config) -> Self {
        Self {
            slides: Arc::new(ImageFileSource),
            segmenter: Arc::new(ThresholdSegmenter::default()),
            exporter: Arc::new(JsonFileExporter::new(config.export.results_dir.clone())),
        }
    }
}

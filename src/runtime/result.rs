/// Per-tile contributions and the aggregate result artifact
///
/// Each job type defines its own contribution shape; `Aggregate` dispatches on
/// the variant and assembles the final `JobArtifact` in row-major tile order.

use crate::runtime::tiles::TileRegion;
use crate::workflow::types::{JobId, JobType};
use serde::{Deserialize, Serialize};

/// A detected region outline, points in slide coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<[u32; 2]>,
}

impl Polygon {
    /// Shift every point by a tile origin
    pub fn translated(mut self, dx: u32, dy: u32) -> Self {
        for point in &mut self.points {
            point[0] += dx;
            point[1] += dy;
        }
        self
    }
}

/// Tissue coverage of one tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMaskSummary {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub mask_mean: f64,
    /// Tile fell below the tissue threshold and was not analysed further
    pub background: bool,
}

impl TileMaskSummary {
    pub fn new(region: TileRegion, mask_mean: f64, background: bool) -> Self {
        Self {
            x: region.x,
            y: region.y,
            w: region.width,
            h: region.height,
            mask_mean,
            background,
        }
    }
}

/// What one tile adds to the aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum TileContribution {
    Cells { region: TileRegion, polygons: Vec<Polygon> },
    Mask(TileMaskSummary),
}

/// Tile accounting for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileStats {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TileStats {
    /// Tiles that went past the background filter
    pub fn attempted(&self) -> usize {
        self.processed + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactBody {
    CellSegmentation { polygons: Vec<Polygon> },
    TissueMask { tiles: Vec<TileMaskSummary> },
}

/// The exported result of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArtifact {
    pub job_id: JobId,
    pub job_type: JobType,
    pub stats: TileStats,
    #[serde(flatten)]
    pub body: ArtifactBody,
}

/// Accumulator owned by the job's collection loop
#[derive(Debug)]
pub enum Aggregate {
    Cells(Vec<(TileRegion, Vec<Polygon>)>),
    Mask(Vec<TileMaskSummary>),
}

impl Aggregate {
    pub fn for_job_type(job_type: JobType) -> Self {
        match job_type {
            JobType::CellSegmentation => Self::Cells(Vec::new()),
            JobType::TissueMask => Self::Mask(Vec::new()),
        }
    }

    pub fn absorb(&mut self, contribution: TileContribution) {
        match (self, contribution) {
            (Self::Cells(tiles), TileContribution::Cells { region, polygons }) => {
                tiles.push((region, polygons));
            }
            (Self::Mask(tiles), TileContribution::Mask(summary)) => tiles.push(summary),
            (_, other) => {
                tracing::warn!("⚠️ Dropping tile contribution of mismatched kind: {:?}", other);
            }
        }
    }

    pub fn finish(self, job_id: JobId, job_type: JobType, stats: TileStats) -> JobArtifact {
        let body = match self {
            Self::Cells(mut tiles) => {
                tiles.sort_by_key(|(region, _)| (region.y, region.x));
                ArtifactBody::CellSegmentation {
                    polygons: tiles.into_iter().flat_map(|(_, polygons)| polygons).collect(),
                }
            }
            Self::Mask(mut tiles) => {
                tiles.sort_by_key(|summary| (summary.y, summary.x));
                ArtifactBody::TissueMask { tiles }
            }
        };
        JobArtifact {
            job_id,
            job_type,
            stats,
            body,
        }
    }
}

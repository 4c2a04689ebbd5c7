/// Error taxonomy for the scheduler core
///
/// `SchedulerError` is surfaced synchronously to callers of store/service operations.
/// `PipelineError` never escapes a worker: the pool converts it into a FAILED job
/// with the error text recorded as the failure reason.

use crate::workflow::types::JobStatus;
use thiserror::Error;

/// Errors returned from submission, lookup and cancellation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    /// Malformed submission, rejected before any state mutation
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown id, or an id owned by a different tenant
    #[error("{0} not found")]
    NotFound(String),

    /// Operation is illegal for the entity's current state
    #[error("job {job_id} is {status}: {reason}")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        reason: String,
    },
}

/// Failures raised while executing a job's tile pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// The slide could not be opened or decoded
    #[error("failed to open slide '{path}': {reason}")]
    ImageOpen { path: String, reason: String },

    /// A tile region could not be read from an open slide
    #[error("failed to read tile at ({x}, {y}): {reason}")]
    TileRead { x: u32, y: u32, reason: String },

    /// The segmentation capability rejected a tile
    #[error("inference failed: {0}")]
    Inference(String),

    /// Too many tiles failed for the aggregate to be meaningful
    #[error("{failed} of {attempted} tiles failed")]
    TooManyTileFailures { failed: usize, attempted: usize },

    /// The result artifact could not be written
    #[error("result export failed: {0}")]
    Export(String),

    /// The worker executing the pipeline died
    #[error("worker failure: {0}")]
    Worker(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

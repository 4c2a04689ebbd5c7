/// Runtime execution layer
///
/// This module turns admitted jobs into tile computations. It handles:
/// - Branch/user/worker admission decisions
/// - The scheduler control loop and its wake events
/// - The bounded worker pool
/// - Tile grids, per-tile analysis and result aggregation

// Pure admission policy over a store snapshot
pub mod admission;

// Scheduler control loop and wake handle
pub mod scheduler;

// Bounded execution slots for tile pipelines
pub mod pool;

// Tile grid and tissue estimate
pub mod tiles;

// Per-tile contributions and aggregate artifacts
pub mod result;

// Per-job tile pipeline
pub mod pipeline;

// Re-export main types
pub use admission::AdmissionLimits;
pub use pipeline::TilePipeline;
pub use pool::WorkerPool;
pub use scheduler::{SchedulerEvent, SchedulerHandle, SchedulerLoop};

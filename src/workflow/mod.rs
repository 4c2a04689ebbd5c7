/// Workflow Management Layer
///
/// This module holds the scheduler's entity model:
/// - Type definitions (Workflow, Job, JobStatus, JobType)
/// - Per-branch FIFO queues of pending jobs
/// - The in-memory entity store with linearizable mutations

// Core workflow and job type definitions
pub mod types;

// Per-branch pending queues
pub mod queue;

// In-memory store guarding all scheduler state
pub mod store;

// Re-export commonly used types
pub use store::{EntityStore, JobOutcome, StoreStats};
pub use types::{Job, JobId, JobSpec, JobStatus, JobType, Workflow, WorkflowId, WorkflowProgress, WorkflowView};

/// slidequeue: multi-tenant scheduler for whole-slide image analysis jobs
///
/// Workflows bundle jobs into named branches. Jobs on one branch run strictly
/// in submission order, different branches run in parallel, and admission is
/// capped by a global worker count and a limit on concurrently active tenants.
/// Each job is executed as a tiled image pipeline with per-tile failure isolation.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by the store, pipeline and API
pub mod error;

// Workflow and job entities, branch queues and the entity store
pub mod workflow;

// Admission policy, scheduler loop, worker pool and tile pipeline
pub mod runtime;

// Pluggable collaborators: slide reading, segmentation and result export
pub mod capability;

// Service facade used by the transport layer
pub mod service;

// HTTP API layer - tenant-scoped REST endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use capability::Capabilities;
pub use config::Config;
pub use error::{PipelineError, SchedulerError};
pub use server::{create_app, start_server};
pub use service::WorkflowService;
pub use workflow::{Job, JobId, JobSpec, JobStatus, JobType, WorkflowId, WorkflowProgress, WorkflowView};

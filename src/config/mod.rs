/// Configuration management for the slidequeue scheduler
///
/// Handles server binding, admission limits, tile pipeline tuning and result export.
/// Every section has constant defaults; `Config::default()` layers environment
/// variables on top of them for container deployment.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Admission limits and scheduler loop timing
    pub scheduler: SchedulerConfig,
    /// Tile grid and per-job concurrency
    pub pipeline: PipelineConfig,
    /// Result artifact output
    pub export: ExportConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Admission limits enforced by the scheduler loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Global cap on RUNNING jobs (worker slots)
    pub max_workers: usize,
    /// Cap on distinct tenants with at least one RUNNING job
    pub max_active_users: usize,
    /// Safety-net wake interval for missed events
    pub tick_interval: Duration,
    /// Capacity of the wake-event channel
    pub event_capacity: usize,
}

/// Tile pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Edge length of a square tile in slide pixels
    pub tile_size: u32,
    /// Overlap between neighbouring tiles; the grid steps by `tile_size - tile_overlap`
    pub tile_overlap: u32,
    /// Tiles with a tissue fraction below this are skipped
    pub tissue_threshold: f64,
    /// Mean RGB intensity at or above which a pixel counts as background
    pub background_level: u8,
    /// In-flight tile computations per job
    pub tile_concurrency: usize,
    /// Job fails when failed/attempted tiles exceeds this ratio
    pub max_tile_failure_ratio: f64,
}

/// Result export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving `{job_id}_cells.json` / `{job_id}_tissue_mask.json`
    pub results_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_active_users: 3,
            tick_interval: Duration::from_millis(100),
            event_capacity: 1024,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            tile_overlap: 64,
            tissue_threshold: 0.05,
            background_level: 240,
            tile_concurrency: 4,
            max_tile_failure_ratio: 0.5,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        let pipeline = PipelineConfig::default();
        let export = ExportConfig::default();

        Self {
            server: ServerConfig {
                host: std::env::var("SLIDEQUEUE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SLIDEQUEUE_PORT", 3004),
            },
            scheduler: SchedulerConfig {
                max_workers: env_or("SLIDEQUEUE_MAX_WORKERS", scheduler.max_workers).max(1),
                max_active_users: env_or("SLIDEQUEUE_MAX_ACTIVE_USERS", scheduler.max_active_users).max(1),
                tick_interval: Duration::from_millis(
                    env_or("SLIDEQUEUE_TICK_MS", scheduler.tick_interval.as_millis() as u64).max(1),
                ),
                event_capacity: env_or("SLIDEQUEUE_EVENT_CAPACITY", scheduler.event_capacity).max(1),
            },
            pipeline: PipelineConfig {
                tile_size: env_or("SLIDEQUEUE_TILE_SIZE", pipeline.tile_size).max(1),
                tile_overlap: env_or("SLIDEQUEUE_TILE_OVERLAP", pipeline.tile_overlap),
                tissue_threshold: env_or("SLIDEQUEUE_TISSUE_THRESHOLD", pipeline.tissue_threshold),
                background_level: env_or("SLIDEQUEUE_BACKGROUND_LEVEL", pipeline.background_level),
                tile_concurrency: env_or("SLIDEQUEUE_TILE_CONCURRENCY", pipeline.tile_concurrency).max(1),
                max_tile_failure_ratio: env_or(
                    "SLIDEQUEUE_MAX_TILE_FAILURE_RATIO",
                    pipeline.max_tile_failure_ratio,
                ),
            },
            export: ExportConfig {
                results_dir: std::env::var("SLIDEQUEUE_RESULTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(export.results_dir),
            },
        }
    }
}

/// Read and parse an environment variable, falling back on absence or parse failure
fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

/// JSON file result exporter
///
/// Writes one artifact per job to `{results_dir}/{job_id}_{cells|tissue_mask}.json`
/// and hands back the file path as the result reference.

use crate::{
    capability::ResultExporter,
    error::PipelineError,
    runtime::result::JobArtifact,
    workflow::types::ResultRef,
};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    results_dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Destination path for an artifact
    pub fn artifact_path(&self, artifact: &JobArtifact) -> PathBuf {
        self.results_dir.join(format!(
            "{}_{}.json",
            artifact.job_id,
            artifact.job_type.artifact_suffix()
        ))
    }
}

#[async_trait]
impl ResultExporter for JsonFileExporter {
    async fn export(&self, artifact: &JobArtifact) -> Result<ResultRef, PipelineError> {
        tokio::fs::create_dir_all(&self.results_dir).await.map_err(|e| {
            PipelineError::Export(format!(
                "failed to create results directory '{}': {e}",
                self.results_dir.display()
            ))
        })?;

        let path = self.artifact_path(artifact);
        let body = serde_json::to_vec(artifact)
            .map_err(|e| PipelineError::Export(format!("failed to serialize artifact: {e}")))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| PipelineError::Export(format!("failed to write '{}': {e}", path.display())))?;

        tracing::info!("💾 Exported result for job {}: {}", artifact.job_id, path.display());
        Ok(ResultRef(path.display().to_string()))
    }
}

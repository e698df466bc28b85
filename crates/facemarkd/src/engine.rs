use facemark_core::{
    Comparison, CosineMatcher, DetectionOutcome, DetectionPipeline, Embedding, MatchError,
    Matcher, PipelineError,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("detection worker failed: {0}")]
    Worker(String),
}

/// Clone-safe handle to the detection pipeline and matcher.
///
/// Detection is blocking CPU work and runs on tokio's blocking pool, one
/// request per worker thread. Comparison is cheap and runs inline.
#[derive(Clone)]
pub struct EngineHandle {
    pipeline: Arc<DetectionPipeline>,
}

impl EngineHandle {
    pub fn new(pipeline: DetectionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Whether the face models have been loaded yet.
    pub fn models_loaded(&self) -> bool {
        self.pipeline.is_initialized()
    }

    /// Detect faces in the image at `image_path`.
    pub async fn detect(&self, image_path: PathBuf) -> Result<DetectionOutcome, EngineError> {
        let pipeline = Arc::clone(&self.pipeline);
        let outcome = tokio::task::spawn_blocking(move || pipeline.detect(&image_path))
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))??;
        Ok(outcome)
    }

    /// Compare `query` against `gallery` with cosine distance.
    pub fn compare(
        &self,
        query: &Embedding,
        gallery: &[Embedding],
        tolerance: f64,
    ) -> Result<Comparison, EngineError> {
        let comparison = CosineMatcher.compare(query, gallery, tolerance)?;
        if let (Some(index), Some(distance)) =
            (comparison.best_match_index, comparison.best_match_distance)
        {
            tracing::info!(
                gallery = gallery.len(),
                index,
                distance,
                "best match found"
            );
        } else {
            tracing::info!(
                gallery = gallery.len(),
                closest = ?comparison.best_match_distance,
                "no match within tolerance"
            );
        }
        Ok(comparison)
    }
}

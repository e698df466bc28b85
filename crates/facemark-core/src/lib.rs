//! facemark-core — Face detection, embedding and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime for CPU inference, behind the [`FaceAnalyzer`]
//! trait. The [`matcher`] module compares embeddings and knows nothing about
//! the models.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod thumbnail;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxFaceAnalyzer, OnnxOptions};
pub use matcher::{Comparison, CosineMatcher, FaceMatch, MatchError, Matcher, DEFAULT_TOLERANCE};
pub use pipeline::{DetectionPipeline, PipelineError, DEFAULT_CONFIDENCE};
pub use types::{DetectionOutcome, Embedding, FaceBox, FaceObservation, FaceRecord};

/// Default ONNX model directory: `$XDG_DATA_HOME/facemark/models`, falling
/// back to `$HOME/.local/share/facemark/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facemark")
        .join("models")
}

//! The model capability: image in, face observations out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::FaceObservation;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTION_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNITION_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0} lock poisoned by an earlier panic")]
    Poisoned(&'static str),
    #[error("{0}")]
    Backend(String),
}

/// Anything that can find faces in an image and embed them.
///
/// Observations are returned in the backend's own order. Every embedding an
/// implementation returns must have exactly [`embedding_dim`](Self::embedding_dim)
/// values.
pub trait FaceAnalyzer: Send + Sync {
    fn analyze(&self, image: &DynamicImage) -> Result<Vec<FaceObservation>, AnalyzerError>;

    fn embedding_dim(&self) -> usize;
}

/// Settings for [`OnnxFaceAnalyzer::load`].
#[derive(Debug, Clone)]
pub struct OnnxOptions {
    pub model_dir: PathBuf,
    /// Square detection input edge in pixels.
    pub det_size: usize,
    pub intra_threads: usize,
}

impl OnnxOptions {
    pub fn detection_model_path(&self) -> PathBuf {
        self.model_dir.join(DETECTION_MODEL_FILE)
    }

    pub fn recognition_model_path(&self) -> PathBuf {
        self.model_dir.join(RECOGNITION_MODEL_FILE)
    }
}

/// SCRFD detection followed by ArcFace recognition.
///
/// ONNX sessions need exclusive access while running, so each one sits behind
/// its own mutex.
pub struct OnnxFaceAnalyzer {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl OnnxFaceAnalyzer {
    pub fn load(options: &OnnxOptions) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(
            &path_str(&options.detection_model_path()),
            options.det_size,
            options.intra_threads,
        )?;
        let recognizer = FaceRecognizer::load(
            &path_str(&options.recognition_model_path()),
            options.intra_threads,
        )?;

        tracing::info!(
            model_dir = %options.model_dir.display(),
            det_size = options.det_size,
            "face analyzer ready"
        );

        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&self, image: &DynamicImage) -> Result<Vec<FaceObservation>, AnalyzerError> {
        let rgb = image.to_rgb8();

        let detections = self
            .detector
            .lock()
            .map_err(|_| AnalyzerError::Poisoned("detector"))?
            .detect(&rgb)?;

        let mut recognizer = self
            .recognizer
            .lock()
            .map_err(|_| AnalyzerError::Poisoned("recognizer"))?;

        let mut observations = Vec::with_capacity(detections.len());
        for det in &detections {
            let embedding = match recognizer.extract(&rgb, det) {
                Ok(e) => Some(e),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(confidence = det.confidence, "detection without landmarks; no embedding");
                    None
                }
                Err(e) => return Err(e.into()),
            };

            observations.push(FaceObservation {
                bbox: [det.x, det.y, det.x + det.width, det.y + det.height],
                confidence: Some(det.confidence),
                embedding,
            });
        }

        Ok(observations)
    }

    fn embedding_dim(&self) -> usize {
        ARCFACE_EMBEDDING_DIM
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths() {
        let options = OnnxOptions {
            model_dir: PathBuf::from("/opt/models"),
            det_size: 640,
            intra_threads: 2,
        };
        assert_eq!(options.detection_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(options.recognition_model_path(), PathBuf::from("/opt/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_load_reports_missing_detection_model() {
        let options = OnnxOptions {
            model_dir: PathBuf::from("/nonexistent/facemark-models"),
            det_size: 640,
            intra_threads: 1,
        };
        let err = OnnxFaceAnalyzer::load(&options).err().unwrap();
        assert!(matches!(err, AnalyzerError::Detector(DetectorError::ModelNotFound(_))));
    }
}

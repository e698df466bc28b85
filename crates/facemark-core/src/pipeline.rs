//! Image → face records.
//!
//! The pipeline owns a lazily-constructed [`FaceAnalyzer`]. The first call to
//! [`DetectionPipeline::detect`] builds it (at most once, even under
//! concurrent first calls) and every later call reuses it.

use crate::analyzer::{AnalyzerError, FaceAnalyzer, OnnxFaceAnalyzer, OnnxOptions};
use crate::thumbnail;
use crate::types::{DetectionOutcome, Embedding, FaceBox, FaceObservation, FaceRecord};
use image::{DynamicImage, ImageError};
use once_cell::sync::OnceCell;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Confidence reported when the backend gives no score for a face.
///
/// A fixed stand-in, not a calibrated value.
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot decode image {}: {reason}", .path.display())]
    Undecodable { path: PathBuf, reason: String },
    #[error("face model initialization failed: {0}")]
    ModelInit(#[source] AnalyzerError),
    #[error("face analysis failed: {0}")]
    Analysis(#[from] AnalyzerError),
    #[error("backend returned a {actual}-value embedding, expected {expected}")]
    EmbeddingArity { expected: usize, actual: usize },
}

type AnalyzerLoader = dyn Fn() -> Result<Box<dyn FaceAnalyzer>, AnalyzerError> + Send + Sync;

/// Face detection pipeline with a once-only model handle.
pub struct DetectionPipeline {
    loader: Box<AnalyzerLoader>,
    analyzer: OnceCell<Box<dyn FaceAnalyzer>>,
}

impl DetectionPipeline {
    /// Create a pipeline that builds its analyzer with `loader` on first use.
    ///
    /// A failing loader leaves the pipeline uninitialized, so a later call
    /// tries again.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn FaceAnalyzer>, AnalyzerError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            analyzer: OnceCell::new(),
        }
    }

    /// Pipeline backed by the SCRFD + ArcFace ONNX models in `options.model_dir`.
    pub fn onnx(options: OnnxOptions) -> Self {
        Self::new(move || {
            OnnxFaceAnalyzer::load(&options).map(|a| Box::new(a) as Box<dyn FaceAnalyzer>)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.analyzer.get().is_some()
    }

    fn analyzer(&self) -> Result<&dyn FaceAnalyzer, PipelineError> {
        self.analyzer
            .get_or_try_init(|| {
                tracing::info!("initializing face analyzer");
                (self.loader)()
            })
            .map(|a| &**a)
            .map_err(PipelineError::ModelInit)
    }

    /// Decode the image at `path` and detect faces in it.
    pub fn detect(&self, path: &Path) -> Result<DetectionOutcome, PipelineError> {
        tracing::info!(path = %path.display(), "processing image");
        let image = load_image(path)?;
        self.detect_image(&image)
    }

    /// Detect faces in an already-decoded image.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<DetectionOutcome, PipelineError> {
        let analyzer = self.analyzer()?;
        let dim = analyzer.embedding_dim();

        let observations = analyzer.analyze(image)?;

        let faces = observations
            .into_iter()
            .map(|obs| build_record(image, obs, dim))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = DetectionOutcome::new(faces);
        tracing::info!(faces = outcome.face_count(), "{}", outcome.message);
        Ok(outcome)
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, PipelineError> {
    image::open(path).map_err(|e| match e {
        ImageError::IoError(io) if io.kind() == ErrorKind::NotFound => {
            PipelineError::NotFound(path.to_path_buf())
        }
        other => PipelineError::Undecodable {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

fn build_record(
    image: &DynamicImage,
    obs: FaceObservation,
    dim: usize,
) -> Result<FaceRecord, PipelineError> {
    let bounding_box = FaceBox::from_corners(obs.bbox);

    let embedding = match obs.embedding {
        Some(e) if e.len() == dim => e,
        Some(e) => {
            return Err(PipelineError::EmbeddingArity {
                expected: dim,
                actual: e.len(),
            })
        }
        None => Embedding::zeros(dim),
    };

    let thumbnail = match thumbnail::face_thumbnail(image, &bounding_box) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(error = %e, ?bounding_box, "thumbnail generation failed");
            None
        }
    };

    Ok(FaceRecord {
        embedding,
        bounding_box,
        confidence: obs.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    struct FixedAnalyzer {
        observations: Vec<FaceObservation>,
        dim: usize,
    }

    impl FaceAnalyzer for FixedAnalyzer {
        fn analyze(&self, _image: &DynamicImage) -> Result<Vec<FaceObservation>, AnalyzerError> {
            Ok(self.observations.clone())
        }

        fn embedding_dim(&self) -> usize {
            self.dim
        }
    }

    struct FailingAnalyzer;

    impl FaceAnalyzer for FailingAnalyzer {
        fn analyze(&self, _image: &DynamicImage) -> Result<Vec<FaceObservation>, AnalyzerError> {
            Err(AnalyzerError::Backend("inference exploded".into()))
        }

        fn embedding_dim(&self) -> usize {
            4
        }
    }

    fn pipeline_with(observations: Vec<FaceObservation>, dim: usize) -> DetectionPipeline {
        DetectionPipeline::new(move || {
            Ok(Box::new(FixedAnalyzer {
                observations: observations.clone(),
                dim,
            }) as Box<dyn FaceAnalyzer>)
        })
    }

    fn obs(bbox: [f32; 4], confidence: Option<f32>, embedding: Option<Vec<f32>>) -> FaceObservation {
        FaceObservation {
            bbox,
            confidence,
            embedding: embedding.map(Embedding::new),
        }
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(160, 120, Rgb([90, 120, 150])))
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("facemark-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_zero_faces_is_success() {
        let pipeline = pipeline_with(vec![], 4);
        let outcome = pipeline.detect_image(&test_image()).unwrap();
        assert_eq!(outcome.face_count(), 0);
        assert!(outcome.faces.is_empty());
        assert_eq!(outcome.message, "No faces detected");
    }

    #[test]
    fn test_preserves_backend_order() {
        // Deliberately neither position- nor confidence-sorted.
        let pipeline = pipeline_with(
            vec![
                obs([100.0, 10.0, 140.0, 60.0], Some(0.55), Some(vec![1.0, 0.0, 0.0, 0.0])),
                obs([5.0, 50.0, 40.0, 100.0], Some(0.99), Some(vec![0.0, 1.0, 0.0, 0.0])),
                obs([50.0, 5.0, 90.0, 45.0], Some(0.70), Some(vec![0.0, 0.0, 1.0, 0.0])),
            ],
            4,
        );
        let outcome = pipeline.detect_image(&test_image()).unwrap();

        let lefts: Vec<i32> = outcome.faces.iter().map(|f| f.bounding_box.left).collect();
        assert_eq!(lefts, vec![100, 5, 50]);
        let confidences: Vec<f32> = outcome.faces.iter().map(|f| f.confidence).collect();
        assert_eq!(confidences, vec![0.55, 0.99, 0.70]);
        assert_eq!(outcome.message, "Detected 3 face(s)");
    }

    #[test]
    fn test_record_geometry_and_thumbnail() {
        let pipeline = pipeline_with(vec![obs([10.6, 20.2, 70.9, 100.5], Some(0.8), None)], 4);
        let outcome = pipeline.detect_image(&test_image()).unwrap();
        let face = &outcome.faces[0];

        assert_eq!(
            face.bounding_box,
            FaceBox { top: 20, right: 70, bottom: 100, left: 10, width: 60, height: 80 }
        );
        assert!(face.thumbnail.is_some());
    }

    #[test]
    fn test_missing_confidence_uses_fixed_default() {
        let pipeline = pipeline_with(vec![obs([0.0, 0.0, 10.0, 10.0], None, None)], 4);
        let outcome = pipeline.detect_image(&test_image()).unwrap();
        assert_eq!(outcome.faces[0].confidence, 0.9);
        assert_eq!(DEFAULT_CONFIDENCE, 0.9);
    }

    #[test]
    fn test_missing_embedding_is_zero_filled_to_fixed_length() {
        let pipeline = pipeline_with(vec![obs([0.0, 0.0, 10.0, 10.0], Some(0.9), None)], 512);
        let outcome = pipeline.detect_image(&test_image()).unwrap();
        let embedding = &outcome.faces[0].embedding;
        assert_eq!(embedding.len(), 512);
        assert!(embedding.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_wrong_embedding_arity_is_internal_error() {
        let pipeline = pipeline_with(vec![obs([0.0, 0.0, 10.0, 10.0], None, Some(vec![1.0; 3]))], 4);
        let err = pipeline.detect_image(&test_image()).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingArity { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_thumbnail_failure_is_isolated_per_face() {
        let pipeline = pipeline_with(
            vec![
                obs([10.0, 10.0, 50.0, 50.0], Some(0.9), None),
                obs([30.0, 30.0, 30.0, 80.0], Some(0.8), None), // zero width
                obs([500.0, 500.0, 600.0, 600.0], Some(0.7), None), // off-image
                obs([60.0, 40.0, 120.0, 110.0], Some(0.6), None),
            ],
            4,
        );
        let outcome = pipeline.detect_image(&test_image()).unwrap();

        assert_eq!(outcome.face_count(), 4);
        let has_thumb: Vec<bool> = outcome.faces.iter().map(|f| f.thumbnail.is_some()).collect();
        assert_eq!(has_thumb, vec![true, false, false, true]);
        assert_eq!(outcome.faces[1].bounding_box.width, 0);
    }

    #[test]
    fn test_analysis_failure_propagates() {
        let pipeline = DetectionPipeline::new(|| Ok(Box::new(FailingAnalyzer) as Box<dyn FaceAnalyzer>));
        let err = pipeline.detect_image(&test_image()).unwrap_err();
        assert!(matches!(err, PipelineError::Analysis(AnalyzerError::Backend(_))));
        assert!(err.to_string().contains("inference exploded"));
    }

    #[test]
    fn test_initialization_happens_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let pipeline = DetectionPipeline::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedAnalyzer { observations: vec![], dim: 4 }) as Box<dyn FaceAnalyzer>)
        });

        assert!(!pipeline.is_initialized());
        for _ in 0..3 {
            pipeline.detect_image(&test_image()).unwrap();
        }
        assert!(pipeline.is_initialized());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_calls_initialize_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let pipeline = Arc::new(DetectionPipeline::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(Box::new(FixedAnalyzer { observations: vec![], dim: 4 }) as Box<dyn FaceAnalyzer>)
        }));

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    pipeline.detect_image(&test_image()).map(|o| o.face_count())
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), 0);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_initialization_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let pipeline = DetectionPipeline::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AnalyzerError::Backend("model missing".into()))
            } else {
                Ok(Box::new(FixedAnalyzer { observations: vec![], dim: 4 }) as Box<dyn FaceAnalyzer>)
            }
        });

        let err = pipeline.detect_image(&test_image()).unwrap_err();
        assert!(matches!(err, PipelineError::ModelInit(_)));
        assert!(!pipeline.is_initialized());

        pipeline.detect_image(&test_image()).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let pipeline = pipeline_with(vec![], 4);
        let err = pipeline.detect(Path::new("/nonexistent/facemark/photo.jpg")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_undecodable_file_is_rejected_before_model_load() {
        let path = temp_path("garbage.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let pipeline = pipeline_with(vec![], 4);
        let err = pipeline.detect(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, PipelineError::Undecodable { .. }));
        assert!(!pipeline.is_initialized());
    }

    #[test]
    fn test_detect_from_disk() {
        let path = temp_path("face.png");
        test_image().save(&path).unwrap();

        let pipeline = pipeline_with(vec![obs([20.0, 20.0, 80.0, 90.0], Some(0.97), None)], 4);
        let outcome = pipeline.detect(&path);
        std::fs::remove_file(&path).ok();

        let outcome = outcome.unwrap();
        assert_eq!(outcome.face_count(), 1);
        assert!(outcome.faces[0].thumbnail.is_some());
    }
}

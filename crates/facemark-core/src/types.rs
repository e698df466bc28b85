use serde::{Deserialize, Serialize};

/// Raw detector output for one face, in source-image pixel space.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face identity embedding (512-dimensional for ArcFace).
///
/// Serialized as a flat numeric array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// All-zero embedding of the given dimensionality.
    pub fn zeros(dim: usize) -> Self {
        Self {
            values: vec![0.0; dim],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when no value is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Cosine similarity in [-1, 1]. A zero-magnitude operand yields 0.
    ///
    /// Only the common prefix is considered; length checks belong to the
    /// matcher.
    pub(crate) fn similarity(&self, other: &Embedding) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// One face as reported by a [`crate::FaceAnalyzer`].
#[derive(Debug, Clone)]
pub struct FaceObservation {
    /// Corners `[x1, y1, x2, y2]`, top-left origin.
    pub bbox: [f32; 4],
    pub confidence: Option<f32>,
    pub embedding: Option<Embedding>,
}

/// Integer face box as returned to callers.
///
/// `left <= right` and `top <= bottom` always hold; zero-area boxes are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    /// Build from float corners, truncating toward zero.
    ///
    /// Corners are reordered if the model reports them inverted.
    pub fn from_corners(bbox: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = bbox.map(|v| v as i32);
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        Self {
            top,
            right,
            bottom,
            left,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

/// A detected face as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    #[serde(rename = "encoding")]
    pub embedding: Embedding,
    pub bounding_box: FaceBox,
    pub confidence: f32,
    /// Base64 JPEG, absent if thumbnail generation failed.
    #[serde(rename = "thumbnail_base64")]
    pub thumbnail: Option<String>,
}

/// Result of one detection call.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub faces: Vec<FaceRecord>,
    pub message: String,
}

impl DetectionOutcome {
    pub fn new(faces: Vec<FaceRecord>) -> Self {
        let message = if faces.is_empty() {
            "No faces detected".to_string()
        } else {
            format!("Detected {} face(s)", faces.len())
        };
        Self { faces, message }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

use facemark_core::detector::DEFAULT_INPUT_SIZE;
use facemark_core::OnnxOptions;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind_addr: String,
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACEMARK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: lookup("FACEMARK_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            model_dir: lookup("FACEMARK_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facemark_core::default_model_dir),
            intra_threads: lookup("FACEMARK_INTRA_THREADS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(2),
        }
    }

    /// Options for the ONNX analyzer; detection always runs at 640×640.
    pub fn onnx_options(&self) -> OnnxOptions {
        OnnxOptions {
            model_dir: self.model_dir.clone(),
            det_size: DEFAULT_INPUT_SIZE,
            intra_threads: self.intra_threads,
        }
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facemark_core::detector::DEFAULT_INPUT_SIZE;
use facemark_core::{CosineMatcher, DetectionPipeline, Embedding, Matcher, OnnxOptions, DEFAULT_TOLERANCE};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facemark", about = "Facemark face detection and matching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image and print the records as JSON
    Detect {
        /// Image file to analyze
        image: PathBuf,
        /// Directory holding det_10g.onnx and w600k_r50.onnx
        #[arg(long, env = "FACEMARK_MODEL_DIR")]
        model_dir: Option<PathBuf>,
        /// ONNX Runtime intra-op threads per session
        #[arg(long, env = "FACEMARK_INTRA_THREADS", default_value_t = 2)]
        intra_threads: usize,
        /// Omit base64 thumbnails from the output
        #[arg(long)]
        no_thumbnails: bool,
    },
    /// Compare a query embedding against a gallery of embeddings
    Compare {
        /// JSON file with one embedding (flat array)
        #[arg(long)]
        query: PathBuf,
        /// JSON file with an array of embeddings
        #[arg(long)]
        gallery: PathBuf,
        /// Maximum cosine distance counted as a match
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
    /// Show status of a running facemarkd
    Status {
        /// Daemon base URL
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            image,
            model_dir,
            intra_threads,
            no_thumbnails,
        } => {
            let pipeline = DetectionPipeline::onnx(OnnxOptions {
                model_dir: model_dir.unwrap_or_else(facemark_core::default_model_dir),
                det_size: DEFAULT_INPUT_SIZE,
                intra_threads,
            });
            let mut outcome = pipeline.detect(&image)?;
            if no_thumbnails {
                outcome.faces.iter_mut().for_each(|f| f.thumbnail = None);
            }
            print_json(&serde_json::json!({
                "success": true,
                "face_count": outcome.face_count(),
                "message": outcome.message,
                "faces": outcome.faces,
            }))?;
        }
        Commands::Compare {
            query,
            gallery,
            tolerance,
        } => {
            let query: Embedding = read_json(&query)?;
            let gallery: Vec<Embedding> = read_json(&gallery)?;
            let comparison = CosineMatcher.compare(&query, &gallery, tolerance)?;
            print_json(&comparison)?;
        }
        Commands::Status { url } => {
            let endpoint = format!("{}/", url.trim_end_matches('/'));
            let status: serde_json::Value = ureq::get(&endpoint)
                .call()
                .with_context(|| format!("facemarkd not reachable at {endpoint}"))?
                .into_json()?;
            print_json(&status)?;
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Embedding comparison against an ordered gallery.
//!
//! Distances are cosine distances (`1 - cosine similarity`), so smaller means
//! more similar. Gallery position is the only identity a result carries.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when the caller does not supply one.
pub const DEFAULT_TOLERANCE: f64 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding length mismatch at gallery index {index}: query has {expected} values, entry has {actual}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("query embedding contains a non-finite value")]
    NonFiniteQuery,
    #[error("embedding at gallery index {index} contains a non-finite value")]
    NonFiniteEntry { index: usize },
    #[error("tolerance must be a number")]
    InvalidTolerance,
}

/// Distance from the query to one gallery entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub index: usize,
    pub distance: f64,
    pub is_match: bool,
}

/// Result of comparing a query against a whole gallery.
///
/// `best_match_distance` is the gallery minimum whenever the gallery is
/// non-empty; `best_match_index` is only set when that minimum is within
/// tolerance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub matches: Vec<FaceMatch>,
    pub best_match_index: Option<usize>,
    pub best_match_distance: Option<f64>,
}

/// Strategy for comparing a query embedding against a gallery.
pub trait Matcher {
    fn compare(
        &self,
        query: &Embedding,
        gallery: &[Embedding],
        tolerance: f64,
    ) -> Result<Comparison, MatchError>;
}

/// Cosine distance. Callers check lengths first.
fn cosine_distance(a: &Embedding, b: &Embedding) -> f64 {
    1.0 - a.similarity(b)
}

/// Cosine-distance matcher. Scans the full gallery in order.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        query: &Embedding,
        gallery: &[Embedding],
        tolerance: f64,
    ) -> Result<Comparison, MatchError> {
        if tolerance.is_nan() {
            return Err(MatchError::InvalidTolerance);
        }
        if !query.is_finite() {
            return Err(MatchError::NonFiniteQuery);
        }
        if gallery.is_empty() {
            return Ok(Comparison::default());
        }

        // Validate every entry before producing any distance.
        for (index, entry) in gallery.iter().enumerate() {
            if entry.len() != query.len() {
                return Err(MatchError::DimensionMismatch {
                    index,
                    expected: query.len(),
                    actual: entry.len(),
                });
            }
            if !entry.is_finite() {
                return Err(MatchError::NonFiniteEntry { index });
            }
        }

        let mut matches = Vec::with_capacity(gallery.len());
        let mut best: Option<(usize, f64)> = None;

        for (index, entry) in gallery.iter().enumerate() {
            let distance = cosine_distance(query, entry);
            matches.push(FaceMatch {
                index,
                distance,
                is_match: distance <= tolerance,
            });

            // Strictly smaller only: ties keep the earliest index.
            let better = match best {
                None => true,
                Some((_, d)) => distance < d,
            };
            if better {
                best = Some((index, distance));
            }
        }

        let (best_index, best_distance) = match best {
            Some(b) => b,
            None => return Ok(Comparison::default()),
        };

        tracing::debug!(
            gallery = gallery.len(),
            best_index,
            best_distance,
            tolerance,
            "compared embedding against gallery"
        );

        Ok(Comparison {
            matches,
            best_match_index: (best_distance <= tolerance).then_some(best_index),
            best_match_distance: Some(best_distance),
        })
    }
}

//! Pairwise similarity of views and the score matrix built from it

/// In-memory [`PairwiseScorer`] over a [`ViewCollection`](crate::core::ViewCollection)
pub mod in_memory;
/// [`ScoreMatrix`] of pairwise and overall scores
pub mod score_matrix;
/// Jaccard and matching similarity measures
pub mod similarity;

use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use in_memory::InMemoryScorer;
#[doc(inline)]
pub use score_matrix::ScoreMatrix;
#[doc(inline)]
pub use similarity::{jaccard_similarity, matching_similarity, SimilarityMeasure};

///
/// Computes the similarity of two views identified by their view index
///
/// Implementations are shared between the workers of the scoring pool,
/// so a single pair computation must not rely on mutable state shared with other pairs.
///
pub trait PairwiseScorer: Sync {
    /// Error produced while scoring a pair
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of views that can be scored
    fn num_views(&self) -> usize;

    /// Prepare everything that must be complete before the first pair is scored
    fn prepare(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Similarity of views `i` and `j` (with `i < j`), in `[0, 1]`
    fn score_pair(&self, i: usize, j: usize) -> Result<f64, Self::Error>;
}

/// Options for computing the [`ScoreMatrix`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    /// Similarity measure used to compare views
    pub measure: SimilarityMeasure,
    /// Number of worker threads computing pairwise scores
    pub workers: usize,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            measure: SimilarityMeasure::default(),
            workers: 6,
        }
    }
}

/// Error type for computing a [`ScoreMatrix`]
#[derive(Debug)]
pub enum ScoringError {
    /// The scoring pool was configured without any worker
    NoWorkers,
    /// The scoring thread pool could not be built
    Pool(rayon::ThreadPoolBuildError),
    /// A pairwise score could not be computed
    Scorer(Box<dyn std::error::Error + Send + Sync>),
    /// A precomputed score matrix is not a valid similarity matrix
    InvalidScoreMatrix(String),
}

impl std::fmt::Display for ScoringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringError::NoWorkers => write!(f, "Number of scoring workers must be at least 1"),
            ScoringError::Pool(e) => write!(f, "Could not build scoring thread pool: {}", e),
            ScoringError::Scorer(e) => write!(f, "Pairwise scoring failed: {}", e),
            ScoringError::InvalidScoreMatrix(reason) => {
                write!(f, "Invalid score matrix: {}", reason)
            }
        }
    }
}

impl std::error::Error for ScoringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScoringError::Pool(e) => Some(e),
            ScoringError::Scorer(e) => Some(e.as_ref()),
            ScoringError::NoWorkers | ScoringError::InvalidScoreMatrix(_) => None,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for ScoringError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        ScoringError::Pool(e)
    }
}

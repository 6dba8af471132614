use itertools::Itertools;
use rayon::prelude::*;

use super::{PairwiseScorer, ScoringError};

/// Value of pairwise cells that have not been computed yet
const UNCOMPUTED: f64 = -1.0;

///
/// Pairwise similarity scores `S` and overall scores `O` of a fixed set of `n` views
///
/// `S` is symmetric with a diagonal of `1`.
/// The overall score of a view is the average of its row of `S` over all `n` views (including itself).
///
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    n: usize,
    /// Row-major `n * n` pairwise scores
    scores: Vec<f64>,
    overall: Vec<f64>,
}

impl ScoreMatrix {
    ///
    /// Compute all pairwise scores with the given scorer on a pool of `workers` threads
    ///
    /// The scorer is invoked exactly once per unordered pair of distinct views.
    /// Panics if any pairwise score is outside `[0, 1]` (or NaN) afterwards, as this can only be caused by a faulty scorer.
    ///
    pub fn compute<S: PairwiseScorer>(scorer: &S, workers: usize) -> Result<Self, ScoringError> {
        if workers == 0 {
            return Err(ScoringError::NoWorkers);
        }
        let n = scorer.num_views();
        scorer
            .prepare()
            .map_err(|e| ScoringError::Scorer(Box::new(e)))?;

        let mut scores = vec![UNCOMPUTED; n * n];
        for i in 0..n {
            scores[i * n + i] = 1.0;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
        log::info!(
            "Computing {} pairwise scores of {} views with {} workers",
            pairs.len(),
            n,
            workers
        );
        let results: Vec<(f64, usize, usize)> = pool
            .install(|| {
                pairs
                    .into_par_iter()
                    .map(|(i, j)| {
                        let sim = scorer.score_pair(i, j)?;
                        log::debug!("Score of views {} and {}: {}", i, j, sim);
                        Ok((sim, i, j))
                    })
                    .collect::<Result<Vec<_>, S::Error>>()
            })
            .map_err(|e| ScoringError::Scorer(Box::new(e)))?;

        for (sim, i, j) in results {
            scores[i * n + j] = sim;
            scores[j * n + i] = sim;
        }
        let mut matrix = Self {
            n,
            scores,
            overall: Vec::new(),
        };
        matrix.assert_computed();
        log::info!("Computed pairwise scores");
        matrix.compute_overall_scores();
        log::info!("Computed overall scores");
        Ok(matrix)
    }

    ///
    /// Use precomputed pairwise scores
    ///
    /// The rows must form a square, symmetric matrix with values in `[0, 1]` and a diagonal of `1`.
    ///
    pub fn from_scores(rows: Vec<Vec<f64>>) -> Result<Self, ScoringError> {
        let n = rows.len();
        let mut scores = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(ScoringError::InvalidScoreMatrix(format!(
                    "row {} has {} entries but the matrix has {} rows",
                    i,
                    row.len(),
                    n
                )));
            }
            scores.extend(row);
        }
        for i in 0..n {
            if scores[i * n + i] != 1.0 {
                return Err(ScoringError::InvalidScoreMatrix(format!(
                    "self-similarity of view {} is {} instead of 1",
                    i,
                    scores[i * n + i]
                )));
            }
            for j in 0..n {
                let sim = scores[i * n + j];
                if !(0.0..=1.0).contains(&sim) {
                    return Err(ScoringError::InvalidScoreMatrix(format!(
                        "score of views {} and {} is {} (outside [0, 1])",
                        i, j, sim
                    )));
                }
                if (sim - scores[j * n + i]).abs() > 1e-9 {
                    return Err(ScoringError::InvalidScoreMatrix(format!(
                        "scores of views {} and {} are not symmetric",
                        i, j
                    )));
                }
            }
        }
        let mut matrix = Self {
            n,
            scores,
            overall: Vec::new(),
        };
        matrix.compute_overall_scores();
        Ok(matrix)
    }

    fn assert_computed(&self) {
        let uncomputed: Vec<(usize, usize)> = (0..self.n)
            .cartesian_product(0..self.n)
            .filter(|&(i, j)| {
                // Also catches NaN
                !(0.0..=1.0).contains(&self.scores[i * self.n + j])
            })
            .collect();
        assert!(
            uncomputed.is_empty(),
            "Pairwise scores uncomputed or outside [0, 1] for view pairs {:?}",
            uncomputed
        );
    }

    fn compute_overall_scores(&mut self) {
        let n = self.n;
        self.overall = self
            .scores
            .chunks(n.max(1))
            .take(n)
            .map(|row| row.iter().sum::<f64>() / n as f64)
            .collect();
    }

    /// Number of views
    pub fn len(&self) -> usize {
        self.n
    }

    /// Checks if the matrix covers no view at all
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Pairwise score of views `i` and `j`
    pub fn score(&self, i: usize, j: usize) -> f64 {
        self.scores[i * self.n + j]
    }

    /// Overall score of view `i`: its average similarity to all views (including itself)
    pub fn overall_score(&self, i: usize) -> f64 {
        self.overall[i]
    }

    /// Overall scores of all views in index order
    pub fn overall_scores(&self) -> &[f64] {
        &self.overall
    }

    /// Row `i` of the pairwise scores
    pub fn row(&self, i: usize) -> &[f64] {
        &self.scores[i * self.n..(i + 1) * self.n]
    }
}

//! Selecting a small, diverse and representative subset of views from a [`ScoreMatrix`]

/// Exhaustive enumeration of all subsets (optimal for the coverage objective)
pub mod enumeration;
/// Greedy Maximal-Marginal-Relevance selection
pub mod mmr;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{ScoreMatrix, ScoringError};

#[doc(inline)]
pub use enumeration::EnumerationSelector;
#[doc(inline)]
pub use mmr::MmrSelector;

/// Strategy used to select views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Greedy Maximal-Marginal-Relevance selection
    #[default]
    Mmr,
    /// Exhaustive enumeration of all `C(n, k)` subsets
    Enumeration,
}

impl SelectionMethod {
    /// Name of the method as accepted by [`SelectionMethod::from_str`]
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::Mmr => "mmr",
            SelectionMethod::Enumeration => "enumeration",
        }
    }
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SelectionMethod {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mmr" => Ok(SelectionMethod::Mmr),
            "enumeration" => Ok(SelectionMethod::Enumeration),
            _ => Err(SelectionError::UnknownMethod(s.to_string())),
        }
    }
}

/// Error type for configuring and running a selection
#[derive(Debug)]
pub enum SelectionError {
    /// More views were requested than there are scorable (non-empty) views
    TooManyViewsRequested {
        /// Requested number of views
        k: usize,
        /// Number of scorable views
        num_views: usize,
    },
    /// MMR weight outside of `[0, 1]` (or NaN)
    InvalidWeight(f64),
    /// Unknown selection method name
    UnknownMethod(String),
    /// Unknown similarity measure name
    UnknownMeasure(String),
    /// Scoring the views failed
    Scoring(ScoringError),
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionError::TooManyViewsRequested { k, num_views } => write!(
                f,
                "Cannot select {} views: only {} non-empty views are available",
                k, num_views
            ),
            SelectionError::InvalidWeight(w) => {
                write!(f, "MMR weight must be within [0, 1], got {}", w)
            }
            SelectionError::UnknownMethod(m) => write!(
                f,
                "Unknown selection method '{}' (expected 'mmr' or 'enumeration')",
                m
            ),
            SelectionError::UnknownMeasure(m) => write!(
                f,
                "Unknown similarity measure '{}' (expected 'jaccard' or 'matching')",
                m
            ),
            SelectionError::Scoring(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SelectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SelectionError::Scoring(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScoringError> for SelectionError {
    fn from(e: ScoringError) -> Self {
        SelectionError::Scoring(e)
    }
}

/// Check that `k` views can be selected out of `num_views`
pub fn check_k(k: usize, num_views: usize) -> Result<(), SelectionError> {
    if k > num_views {
        return Err(SelectionError::TooManyViewsRequested { k, num_views });
    }
    Ok(())
}

/// Configuration of a selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Number of views to select
    pub k: usize,
    /// MMR trade-off between representativeness (`1`) and novelty (`0`)
    pub weight: f64,
    /// Selection strategy
    #[serde(alias = "selection_method")]
    pub method: SelectionMethod,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            k: 4,
            weight: 0.5,
            method: SelectionMethod::Mmr,
        }
    }
}

impl SelectionConfig {
    /// Check the configuration against the number of scorable views
    pub fn validate(&self, num_views: usize) -> Result<(), SelectionError> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(SelectionError::InvalidWeight(self.weight));
        }
        check_k(self.k, num_views)
    }

    /// Build the configured selector
    pub fn selector(&self) -> Result<Selector, SelectionError> {
        Ok(match self.method {
            SelectionMethod::Mmr => Selector::Mmr(MmrSelector::new(self.weight)?),
            SelectionMethod::Enumeration => Selector::Enumeration(EnumerationSelector),
        })
    }

    /// Validate the configuration and select `k` views
    pub fn select(&self, matrix: &ScoreMatrix) -> Result<SelectionResult, SelectionError> {
        self.validate(matrix.len())?;
        self.selector()?.select(matrix, self.k)
    }
}

/// Diagnostics recorded with every selected view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreInfo {
    /// Step of the MMR selection
    Mmr {
        /// Overall score of the selected view
        sim_score: f64,
        /// MMR score of the selected view (`None` in the first step)
        mmr_score: Option<f64>,
        /// Maximal similarity to the previously selected views
        max_sim_to_prev: Option<f64>,
        /// Minimal similarity to the previously selected views
        min_sim_to_prev: Option<f64>,
        /// Average similarity to the previously selected views
        avg_sim_to_prev: Option<f64>,
    },
    /// Member of the best subset found by enumeration
    Coverage {
        /// Total coverage of the selected subset
        coverage: f64,
        /// Maximal similarity between two distinct selected views (`None` for fewer than two)
        max_sim_among_selected: Option<f64>,
    },
}

/// A single selected view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStep {
    /// Index of the selected view
    pub view_index: usize,
    /// Score the view was selected with
    pub score: f64,
    /// Further diagnostics
    pub score_info: ScoreInfo,
    /// When the view was selected
    pub timestamp: DateTime<Utc>,
}

///
/// Ordered sequence of selected views
///
/// Every view index occurs at most once.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    steps: Vec<SelectionStep>,
}

impl SelectionResult {
    pub(crate) fn push(&mut self, step: SelectionStep) {
        debug_assert!(!self.contains(step.view_index));
        self.steps.push(step);
    }

    /// Checks if the view was already selected
    pub fn contains(&self, view_index: usize) -> bool {
        self.steps.iter().any(|s| s.view_index == view_index)
    }

    /// Selected views in selection order
    pub fn steps(&self) -> &[SelectionStep] {
        &self.steps
    }

    /// Indices of the selected views in selection order
    pub fn view_indices(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.view_index).collect()
    }

    /// Number of selected views
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Checks if no view was selected
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Get the inner selection steps
    pub fn into_inner(self) -> Vec<SelectionStep> {
        self.steps
    }
}

///
/// Selects `k` views based on their pairwise and overall scores
///
pub trait SubsetSelector {
    /// Select `k` distinct views
    ///
    /// Fails if `k` exceeds the number of views of the matrix; `k = 0` yields an empty result.
    fn select(&self, matrix: &ScoreMatrix, k: usize) -> Result<SelectionResult, SelectionError>;
}

/// One of the available selection strategies, chosen when the configuration is parsed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selector {
    /// Greedy MMR selection
    Mmr(MmrSelector),
    /// Exhaustive enumeration
    Enumeration(EnumerationSelector),
}

impl SubsetSelector for Selector {
    fn select(&self, matrix: &ScoreMatrix, k: usize) -> Result<SelectionResult, SelectionError> {
        match self {
            Selector::Mmr(s) => s.select(matrix, k),
            Selector::Enumeration(s) => s.select(matrix, k),
        }
    }
}

///
/// Coverage of a subset of views: the sum over all views of their best similarity to any member of the subset
///
/// `0` for an empty subset.
///
pub fn coverage_score(matrix: &ScoreMatrix, subset: &[usize]) -> f64 {
    (0..matrix.len())
        .map(|v| {
            subset
                .iter()
                .map(|&s| matrix.score(v, s))
                .fold(0.0, f64::max)
        })
        .sum()
}

use std::convert::Infallible;

use super::{PairwiseScorer, SimilarityMeasure};
use crate::core::view::ViewCollection;

///
/// Scores pairs of in-memory views with a [`SimilarityMeasure`]
///
#[derive(Debug, Clone, Copy)]
pub struct InMemoryScorer<'a> {
    views: &'a ViewCollection,
    measure: SimilarityMeasure,
}

impl<'a> InMemoryScorer<'a> {
    /// Create a scorer for the given views
    pub fn new(views: &'a ViewCollection, measure: SimilarityMeasure) -> Self {
        Self { views, measure }
    }

    /// The similarity measure in use
    pub fn measure(&self) -> SimilarityMeasure {
        self.measure
    }
}

impl PairwiseScorer for InMemoryScorer<'_> {
    type Error = Infallible;

    fn num_views(&self) -> usize {
        self.views.len()
    }

    fn score_pair(&self, i: usize, j: usize) -> Result<f64, Infallible> {
        Ok(self.measure.similarity(
            &self.views[i].relation_index,
            &self.views[j].relation_index,
        ))
    }
}

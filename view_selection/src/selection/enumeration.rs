use chrono::Utc;
use itertools::Itertools;
use rayon::prelude::*;

use super::{
    check_k, coverage_score, ScoreInfo, SelectionError, SelectionResult, SelectionStep,
    SubsetSelector,
};
use crate::scoring::ScoreMatrix;

///
/// Exhaustive selection of the subset of `k` views with maximal coverage
///
/// Evaluates all `C(n, k)` subsets in parallel, so it is only feasible for small `n`.
/// Among subsets with equal coverage, the lexicographically first one is chosen.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSelector;

impl SubsetSelector for EnumerationSelector {
    fn select(&self, matrix: &ScoreMatrix, k: usize) -> Result<SelectionResult, SelectionError> {
        check_k(k, matrix.len())?;
        let mut result = SelectionResult::default();
        if k == 0 {
            return Ok(result);
        }
        let best = (0..matrix.len())
            .combinations(k)
            .enumerate()
            .par_bridge()
            .map(|(rank, subset)| (rank, coverage_score(matrix, &subset), subset))
            .reduce_with(|a, b| {
                if b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) {
                    b
                } else {
                    a
                }
            });
        let Some((_, coverage, subset)) = best else {
            return Ok(result);
        };
        let max_sim_among_selected = subset
            .iter()
            .tuple_combinations()
            .map(|(&a, &b)| matrix.score(a, b))
            .reduce(f64::max);
        log::info!("Best subset {:?} covers {:.4}", subset, coverage);

        let timestamp = Utc::now();
        for view_index in subset {
            result.push(SelectionStep {
                view_index,
                score: coverage,
                score_info: ScoreInfo::Coverage {
                    coverage,
                    max_sim_among_selected,
                },
                timestamp,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::selection::tests::{random_matrix, scenario_matrix};
    use crate::selection::MmrSelector;

    #[test]
    fn covers_both_clusters() {
        let matrix = scenario_matrix();
        let result = EnumerationSelector.select(&matrix, 2).unwrap();
        let indices = result.view_indices();
        assert!([0, 1].contains(&indices[0]));
        assert!([2, 3].contains(&indices[1]));
        let shared = matrix.score(indices[0], indices[1]);
        for step in result.steps() {
            assert!((step.score - 3.7).abs() < 1e-12);
            assert_eq!(
                step.score_info,
                ScoreInfo::Coverage {
                    coverage: step.score,
                    max_sim_among_selected: Some(shared)
                }
            );
        }
    }

    #[test]
    fn single_view_has_no_shared_similarity() {
        let result = EnumerationSelector.select(&scenario_matrix(), 1).unwrap();
        assert_eq!(result.len(), 1);
        assert!(matches!(
            result.steps()[0].score_info,
            ScoreInfo::Coverage {
                max_sim_among_selected: None,
                ..
            }
        ));
    }

    #[test]
    fn boundaries() {
        let matrix = scenario_matrix();
        assert!(EnumerationSelector.select(&matrix, 0).unwrap().is_empty());
        assert_eq!(EnumerationSelector.select(&matrix, 4).unwrap().len(), 4);
        assert!(matches!(
            EnumerationSelector.select(&matrix, 5),
            Err(SelectionError::TooManyViewsRequested { .. })
        ));
    }

    #[test]
    fn enumeration_coverage_bounds_mmr_coverage() {
        let mut rng = StdRng::seed_from_u64(17);
        for n in 1..=6 {
            for _ in 0..10 {
                let matrix = random_matrix(&mut rng, n);
                for k in 1..=n {
                    let enumerated = EnumerationSelector.select(&matrix, k).unwrap();
                    let greedy = MmrSelector::default().select(&matrix, k).unwrap();
                    let optimal = coverage_score(&matrix, &enumerated.view_indices());
                    let heuristic = coverage_score(&matrix, &greedy.view_indices());
                    assert!(optimal >= heuristic - 1e-12);
                }
            }
        }
    }
}

use chrono::Utc;

use super::{check_k, ScoreInfo, SelectionError, SelectionResult, SelectionStep, SubsetSelector};
use crate::scoring::ScoreMatrix;

///
/// Greedy Maximal-Marginal-Relevance selection
///
/// The first view is the one with the highest overall score.
/// Every further view maximizes `weight * overall_score - (1 - weight) * max_sim_to_selected`.
/// Ties are broken in favor of the lowest view index.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrSelector {
    weight: f64,
}

impl MmrSelector {
    /// Create a selector with the given trade-off weight in `[0, 1]`
    pub fn new(weight: f64) -> Result<Self, SelectionError> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(SelectionError::InvalidWeight(weight));
        }
        Ok(Self { weight })
    }

    /// Trade-off weight between representativeness and novelty
    pub fn weight(&self) -> f64 {
        self.weight
    }

    fn first_step(&self, matrix: &ScoreMatrix) -> Option<SelectionStep> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &score) in matrix.overall_scores().iter().enumerate() {
            if best.map_or(true, |(_, max)| score > max) {
                best = Some((i, score));
            }
        }
        best.map(|(view_index, score)| SelectionStep {
            view_index,
            score,
            score_info: ScoreInfo::Mmr {
                sim_score: score,
                mmr_score: None,
                max_sim_to_prev: None,
                min_sim_to_prev: None,
                avg_sim_to_prev: None,
            },
            timestamp: Utc::now(),
        })
    }

    fn next_step(&self, matrix: &ScoreMatrix, selected: &SelectionResult) -> Option<SelectionStep> {
        let mut max_score = f64::NEG_INFINITY;
        let mut best: Option<(usize, Vec<f64>)> = None;
        for i in (0..matrix.len()).filter(|&i| !selected.contains(i)) {
            let sims: Vec<f64> = selected
                .steps()
                .iter()
                .map(|s| matrix.score(i, s.view_index))
                .collect();
            let max_sim_to_prev = sims.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mmr_score =
                self.weight * matrix.overall_score(i) - (1.0 - self.weight) * max_sim_to_prev;
            if mmr_score > max_score {
                max_score = mmr_score;
                best = Some((i, sims));
            }
        }
        best.map(|(view_index, sims)| {
            let max = sims.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = sims.iter().copied().fold(f64::INFINITY, f64::min);
            let avg = sims.iter().sum::<f64>() / sims.len() as f64;
            SelectionStep {
                view_index,
                score: max_score,
                score_info: ScoreInfo::Mmr {
                    sim_score: matrix.overall_score(view_index),
                    mmr_score: Some(max_score),
                    max_sim_to_prev: Some(max),
                    min_sim_to_prev: Some(min),
                    avg_sim_to_prev: Some(avg),
                },
                timestamp: Utc::now(),
            }
        })
    }
}

impl Default for MmrSelector {
    fn default() -> Self {
        Self { weight: 0.5 }
    }
}

impl SubsetSelector for MmrSelector {
    fn select(&self, matrix: &ScoreMatrix, k: usize) -> Result<SelectionResult, SelectionError> {
        check_k(k, matrix.len())?;
        let mut result = SelectionResult::default();
        for _ in 0..k {
            let step = if result.is_empty() {
                self.first_step(matrix)
            } else {
                self.next_step(matrix, &result)
            };
            // k <= n guarantees an unselected view in every step
            let Some(step) = step else {
                break;
            };
            log::info!(
                "Selected view {} (score: {:.4}) in step {}",
                step.view_index,
                step.score,
                result.len() + 1
            );
            result.push(step);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::selection::tests::{random_matrix, scenario_matrix};

    #[test]
    fn picks_representative_view_then_other_cluster() {
        let matrix = scenario_matrix();
        let result = MmrSelector::new(0.5).unwrap().select(&matrix, 2).unwrap();
        let indices = result.view_indices();
        assert_eq!(indices.len(), 2);
        assert!([2, 3].contains(&indices[0]));
        assert!([0, 1].contains(&indices[1]));

        match &result.steps()[0].score_info {
            ScoreInfo::Mmr {
                sim_score,
                mmr_score,
                max_sim_to_prev,
                ..
            } => {
                assert!((sim_score - 0.55).abs() < 1e-12);
                assert_eq!(mmr_score, &None);
                assert_eq!(max_sim_to_prev, &None);
            }
            other => panic!("Unexpected score info {other:?}"),
        }
        match &result.steps()[1].score_info {
            ScoreInfo::Mmr {
                mmr_score: Some(mmr),
                max_sim_to_prev: Some(max),
                min_sim_to_prev: Some(min),
                avg_sim_to_prev: Some(avg),
                ..
            } => {
                assert_eq!(max, min);
                assert_eq!(max, avg);
                assert!((mmr - (0.5 * 0.525 - 0.5 * 0.1)).abs() < 1e-12);
                assert_eq!(*mmr, result.steps()[1].score);
            }
            other => panic!("Unexpected score info {other:?}"),
        }
        assert!(result.steps()[0].timestamp <= result.steps()[1].timestamp);
    }

    #[test]
    fn ties_pick_lowest_index() {
        let matrix = ScoreMatrix::from_scores(vec![
            vec![1.0, 0.5, 0.5],
            vec![0.5, 1.0, 0.5],
            vec![0.5, 0.5, 1.0],
        ])
        .unwrap();
        let result = MmrSelector::default().select(&matrix, 3).unwrap();
        assert_eq!(result.view_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn weight_one_is_pure_representativeness() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let matrix = random_matrix(&mut rng, 6);
            let result = MmrSelector::new(1.0).unwrap().select(&matrix, 4).unwrap();
            let mut by_overall: Vec<usize> = (0..6).collect();
            by_overall.sort_by(|&a, &b| {
                matrix
                    .overall_score(b)
                    .total_cmp(&matrix.overall_score(a))
                    .then(a.cmp(&b))
            });
            assert_eq!(result.view_indices(), by_overall[..4].to_vec());
        }
    }

    #[test]
    fn weight_zero_is_pure_novelty() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let matrix = random_matrix(&mut rng, 6);
            let result = MmrSelector::new(0.0).unwrap().select(&matrix, 3).unwrap();
            let indices = result.view_indices();
            for step in 1..indices.len() {
                let selected = &indices[..step];
                let max_sim = |i: usize| {
                    selected
                        .iter()
                        .map(|&s| matrix.score(i, s))
                        .fold(f64::NEG_INFINITY, f64::max)
                };
                let chosen = max_sim(indices[step]);
                for i in (0..6).filter(|i| !selected.contains(i)) {
                    assert!(chosen <= max_sim(i));
                }
            }
        }
    }

    #[test]
    fn selects_exactly_k_distinct_views() {
        let mut rng = StdRng::seed_from_u64(3);
        let matrix = random_matrix(&mut rng, 8);
        for k in 0..=8 {
            let result = MmrSelector::default().select(&matrix, k).unwrap();
            assert_eq!(result.len(), k);
            let distinct: HashSet<usize> = result.view_indices().into_iter().collect();
            assert_eq!(distinct.len(), k);
        }
    }

    #[test]
    fn boundaries() {
        let matrix = scenario_matrix();
        assert!(MmrSelector::default().select(&matrix, 0).unwrap().is_empty());
        assert!(matches!(
            MmrSelector::default().select(&matrix, 5),
            Err(SelectionError::TooManyViewsRequested { k: 5, num_views: 4 })
        ));
        assert!(matches!(
            MmrSelector::new(f64::NAN),
            Err(SelectionError::InvalidWeight(_))
        ));
    }
}

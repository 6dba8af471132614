use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::view::{InstanceIndex, RelationIndex};

/// Similarity measure used to compare two views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMeasure {
    /// Jaccard similarity of the (distinct) edge sets, ignoring instance membership
    Jaccard,
    /// Matching similarity: best per-instance Jaccard matches in both directions
    #[default]
    Matching,
}

impl SimilarityMeasure {
    /// Name of the measure as accepted by [`SimilarityMeasure::from_str`]
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMeasure::Jaccard => "jaccard",
            SimilarityMeasure::Matching => "matching",
        }
    }

    /// Compute the similarity of two in-memory views
    pub fn similarity(&self, a: &RelationIndex, b: &RelationIndex) -> f64 {
        match self {
            SimilarityMeasure::Jaccard => jaccard_similarity(a, b),
            SimilarityMeasure::Matching => matching_similarity(a, b),
        }
    }
}

impl std::fmt::Display for SimilarityMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SimilarityMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jaccard" => Ok(SimilarityMeasure::Jaccard),
            "matching" => Ok(SimilarityMeasure::Matching),
            _ => Err(s.to_string()),
        }
    }
}

///
/// Jaccard similarity of the edge sets of two views
///
/// `|E1 ∩ E2| / |E1 ∪ E2|`; `0` if the views do not share any edge (including if one of them has no edges).
///
pub fn jaccard_similarity(a: &RelationIndex, b: &RelationIndex) -> f64 {
    let (smaller, larger) = if a.num_edges() <= b.num_edges() {
        (a, b)
    } else {
        (b, a)
    };
    let intersection = smaller
        .edge_ids()
        .filter(|e| larger.contains_edge(e))
        .count();
    if intersection == 0 {
        return 0.0;
    }
    intersection as f64 / (a.num_edges() + b.num_edges() - intersection) as f64
}

/// Jaccard similarity of two instances with `count_a` and `count_b` distinct edges, sharing `shared` of them
///
/// Instances without any edge do not match anything.
fn instance_similarity(shared: usize, count_a: usize, count_b: usize) -> f64 {
    let union = count_a + count_b - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

///
/// Matching similarity of two views
///
/// For every pair of instances `(ca, cb)` of the two views, the number of edges they share is accumulated
/// (each shared edge contributes to all pairs of instances it occurs in).
/// The similarity of an instance pair is the Jaccard similarity of their edge sets.
/// Every instance of either view is then matched to its most similar instance of the other view,
/// and the final score is the sum of these best matches divided by the total number of instances of both views.
///
/// Only instance pairs sharing at least one edge are materialized; all other pairs have similarity `0`.
///
pub fn matching_similarity(a: &RelationIndex, b: &RelationIndex) -> f64 {
    let num_a = a.num_process_executions();
    let num_b = b.num_process_executions();
    if num_a + num_b == 0 {
        return 0.0;
    }
    let counts_a = a.edge_counts_per_instance();
    let counts_b = b.edge_counts_per_instance();

    let mut intersect: HashMap<(InstanceIndex, InstanceIndex), usize> = HashMap::new();
    for (edge, instances_a) in a.edges() {
        if let Some(instances_b) = b.instances_of(edge) {
            for &ca in instances_a {
                for &cb in instances_b {
                    *intersect.entry((ca, cb)).or_default() += 1;
                }
            }
        }
    }

    let mut best_a = vec![0.0_f64; num_a];
    let mut best_b = vec![0.0_f64; num_b];
    for ((ca, cb), shared) in intersect {
        let sim = instance_similarity(shared, counts_a[ca], counts_b[cb]);
        best_a[ca] = best_a[ca].max(sim);
        best_b[cb] = best_b[cb].max(sim);
    }

    (best_a.iter().sum::<f64>() + best_b.iter().sum::<f64>()) / (num_a + num_b) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(num: usize, entries: Vec<(u64, Vec<usize>)>) -> RelationIndex {
        RelationIndex::from_entries(num, entries).unwrap()
    }

    #[test]
    fn jaccard_identity_and_disjointness() {
        let a = index(2, vec![(1, vec![0]), (2, vec![1]), (3, vec![0, 1])]);
        let b = index(1, vec![(1, vec![0]), (2, vec![0]), (3, vec![0])]);
        let c = index(1, vec![(4, vec![0]), (5, vec![0])]);
        assert_eq!(jaccard_similarity(&a, &b), 1.0);
        assert_eq!(jaccard_similarity(&a, &c), 0.0);
        assert_eq!(jaccard_similarity(&a, &RelationIndex::new(1)), 0.0);
        assert_eq!(
            jaccard_similarity(&RelationIndex::new(1), &RelationIndex::new(1)),
            0.0
        );
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = index(1, vec![(1, vec![0]), (2, vec![0]), (3, vec![0])]);
        let b = index(1, vec![(2, vec![0]), (3, vec![0]), (4, vec![0])]);
        assert!((jaccard_similarity(&a, &b) - 0.5).abs() < 1e-12);
        assert_eq!(jaccard_similarity(&a, &b), jaccard_similarity(&b, &a));
    }

    #[test]
    fn matching_identical_views() {
        // (1,2): [0,1,2], (2,3): [0,2], (3,4): [1,2]
        let a = index(3, vec![(0, vec![0, 1, 2]), (1, vec![0, 2]), (2, vec![1, 2])]);
        assert!((matching_similarity(&a, &a.clone()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn matching_partial_coverage() {
        // (1,2): [0], (2,3): [0], (3,4): [0] vs. every edge in every instance
        let a = index(3, vec![(0, vec![0]), (1, vec![0]), (2, vec![0])]);
        let b = index(3, vec![(0, vec![0, 1, 2]), (1, vec![0, 1, 2]), (2, vec![0, 1, 2])]);
        let sim = matching_similarity(&a, &b);
        // Instance 0 of a matches all of b perfectly, instances 1 and 2 of a have no edges
        assert!((sim - 4.0 / 6.0).abs() < 1e-12);
        assert!(sim < 1.0);
        assert_eq!(sim, matching_similarity(&b, &a));
    }

    #[test]
    fn matching_shifted_edges() {
        // (1,2): [0,1,2], (2,3): [0,2], (3,4): [1,2] vs. (1,2): [0,1,2], (5,3): [0,2], (3,4): [0]
        let a = index(3, vec![(0, vec![0, 1, 2]), (1, vec![0, 2]), (2, vec![1, 2])]);
        let b = index(3, vec![(0, vec![0, 1, 2]), (3, vec![0, 2]), (2, vec![0])]);
        // counts a: [2, 2, 3], counts b: [3, 1, 2]
        // best a: [2/3, 2/3, 2/3], best b: [2/3, 1/2, 1/2]
        let expected = (2.0 / 3.0 * 4.0 + 0.5 * 2.0) / 6.0;
        assert!((matching_similarity(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn matching_without_any_edges_is_zero_not_nan() {
        let a = RelationIndex::new(2);
        let b = RelationIndex::new(3);
        let sim = matching_similarity(&a, &b);
        assert_eq!(sim, 0.0);
        assert_eq!(matching_similarity(&RelationIndex::new(0), &RelationIndex::new(0)), 0.0);
    }

    #[test]
    fn parse_measure() {
        assert_eq!("Jaccard".parse::<SimilarityMeasure>(), Ok(SimilarityMeasure::Jaccard));
        assert_eq!("matching".parse::<SimilarityMeasure>(), Ok(SimilarityMeasure::Matching));
        assert!("cosine".parse::<SimilarityMeasure>().is_err());
    }
}

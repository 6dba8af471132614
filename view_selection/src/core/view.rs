use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// An Edge Index
///
/// Identifies a directly-follows edge (an ordered pair of events) in the context of
/// the [`RelationIndexBuilder`](super::relation_index_builder::RelationIndexBuilder) session that assigned it.
/// Edge indices of views built by the same session are comparable.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(u64);
impl From<&EdgeId> for EdgeId {
    fn from(value: &EdgeId) -> Self {
        *value
    }
}
impl From<u64> for EdgeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
impl EdgeId {
    /// Retrieve inner index value
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

/// Index of a process execution (also called instance or context), local to one view
pub type InstanceIndex = usize;

/// Error type for building, staging or importing views
#[derive(Debug)]
pub enum ViewError {
    /// An edge was recorded for an instance outside of `[0, num_process_executions)`
    InstanceOutOfRange {
        /// The offending edge
        edge: EdgeId,
        /// The out-of-range instance index
        instance: InstanceIndex,
        /// Number of process executions of the view
        num_process_executions: usize,
    },
    /// The instances of an edge are not a sorted set (unsorted or listed more than once)
    InstancesNotASet {
        /// The offending edge
        edge: EdgeId,
    },
    /// Staging the relation index on disk exceeded the configured size limit
    StagingLimitExceeded {
        /// Label of the view that was being built
        label: String,
        /// Configured limit in bytes
        limit: u64,
        /// Observed size of the staging file in bytes
        size: u64,
    },
    /// IO Error
    Io(std::io::Error),
    /// CSV Error (reading or writing staged rows)
    Csv(csv::Error),
    /// JSON Error
    Json(serde_json::Error),
}

impl std::fmt::Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewError::InstanceOutOfRange {
                edge,
                instance,
                num_process_executions,
            } => write!(
                f,
                "Edge {} references instance {} but the view only has {} process executions",
                edge.0, instance, num_process_executions
            ),
            ViewError::InstancesNotASet { edge } => write!(
                f,
                "Instances of edge {} must be listed in ascending order without duplicates",
                edge.0
            ),
            ViewError::StagingLimitExceeded { label, limit, size } => write!(
                f,
                "Relation index too large: staging view '{}' reached {} bytes (limit: {} bytes)",
                label, size, limit
            ),
            ViewError::Io(e) => write!(f, "IO Error: {}", e),
            ViewError::Csv(e) => write!(f, "CSV Error: {}", e),
            ViewError::Json(e) => write!(f, "JSON Error: {}", e),
        }
    }
}

impl std::error::Error for ViewError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewError::Io(e) => Some(e),
            ViewError::Csv(e) => Some(e),
            ViewError::Json(e) => Some(e),
            ViewError::InstanceOutOfRange { .. }
            | ViewError::InstancesNotASet { .. }
            | ViewError::StagingLimitExceeded { .. } => None,
        }
    }
}

impl From<std::io::Error> for ViewError {
    fn from(e: std::io::Error) -> Self {
        ViewError::Io(e)
    }
}

impl From<csv::Error> for ViewError {
    fn from(e: csv::Error) -> Self {
        ViewError::Csv(e)
    }
}

impl From<serde_json::Error> for ViewError {
    fn from(e: serde_json::Error) -> Self {
        ViewError::Json(e)
    }
}

///
/// Relation index of a single view
///
/// Maps every directly-follows edge to the (sorted, duplicate-free) set of process executions it occurs in.
/// Additionally keeps the number of process executions of the view and the total number of events across them.
///
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationIndex {
    #[serde_as(as = "Vec<(_, _)>")]
    edges: HashMap<EdgeId, Vec<InstanceIndex>>,
    num_process_executions: usize,
    num_events: usize,
}

impl RelationIndex {
    /// Create an empty [`RelationIndex`] for a view with `num_process_executions` instances
    pub fn new(num_process_executions: usize) -> Self {
        Self {
            edges: HashMap::new(),
            num_process_executions,
            num_events: 0,
        }
    }

    /// Construct a [`RelationIndex`] from `(edge, instances)` entries
    ///
    /// Fails if any instance is not below `num_process_executions`.
    pub fn from_entries<E, I>(
        num_process_executions: usize,
        entries: impl IntoIterator<Item = (E, I)>,
    ) -> Result<Self, ViewError>
    where
        E: Into<EdgeId>,
        I: IntoIterator<Item = InstanceIndex>,
    {
        let mut index = Self::new(num_process_executions);
        for (edge, instances) in entries {
            let edge = edge.into();
            for instance in instances {
                index.insert(edge, instance)?;
            }
        }
        Ok(index)
    }

    /// Record that `edge` occurs in `instance`
    ///
    /// Returns `true` if the membership was new.
    pub fn insert(&mut self, edge: EdgeId, instance: InstanceIndex) -> Result<bool, ViewError> {
        if instance >= self.num_process_executions {
            return Err(ViewError::InstanceOutOfRange {
                edge,
                instance,
                num_process_executions: self.num_process_executions,
            });
        }
        let instances = self.edges.entry(edge).or_default();
        match instances.binary_search(&instance) {
            Ok(_) => Ok(false),
            Err(pos) => {
                instances.insert(pos, instance);
                Ok(true)
            }
        }
    }

    /// Append a new (initially edge-less) process execution and return its index
    pub fn push_instance(&mut self) -> InstanceIndex {
        self.num_process_executions += 1;
        self.num_process_executions - 1
    }

    /// Add to the total number of events
    pub fn add_events(&mut self, num_events: usize) {
        self.num_events += num_events;
    }

    /// Check that the instances of every edge form a sorted set within `[0, num_process_executions)`
    ///
    /// Useful after deserializing a [`RelationIndex`].
    pub fn validate(&self) -> Result<(), ViewError> {
        for (edge, instances) in &self.edges {
            if instances.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ViewError::InstancesNotASet { edge: *edge });
            }
            if let Some(&instance) = instances
                .iter()
                .find(|&&instance| instance >= self.num_process_executions)
            {
                return Err(ViewError::InstanceOutOfRange {
                    edge: *edge,
                    instance,
                    num_process_executions: self.num_process_executions,
                });
            }
        }
        Ok(())
    }

    /// Number of process executions
    pub fn num_process_executions(&self) -> usize {
        self.num_process_executions
    }

    /// Total number of events across all process executions
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Average number of events per process execution (`0` if there are none)
    pub fn avg_events_per_trace(&self) -> f64 {
        if self.num_process_executions == 0 {
            0.0
        } else {
            self.num_events as f64 / self.num_process_executions as f64
        }
    }

    /// Number of distinct edges
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Iterate over all edges and the instances they occur in
    pub fn edges(&self) -> impl Iterator<Item = (&EdgeId, &[InstanceIndex])> {
        self.edges.iter().map(|(e, i)| (e, i.as_slice()))
    }

    /// Iterate over the distinct edges
    pub fn edge_ids(&self) -> impl Iterator<Item = &EdgeId> {
        self.edges.keys()
    }

    /// Instances the edge occurs in, if the edge is part of this view
    pub fn instances_of(&self, edge: &EdgeId) -> Option<&[InstanceIndex]> {
        self.edges.get(edge).map(Vec::as_slice)
    }

    /// Checks if an edge is contained in this view
    pub fn contains_edge(&self, edge: &EdgeId) -> bool {
        self.edges.contains_key(edge)
    }

    /// The set of distinct edges, ignoring instance membership
    pub fn edge_set(&self) -> HashSet<EdgeId> {
        self.edges.keys().copied().collect()
    }

    /// Number of distinct edges per instance
    pub fn edge_counts_per_instance(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_process_executions];
        for instances in self.edges.values() {
            for &instance in instances {
                counts[instance] += 1;
            }
        }
        counts
    }
}

/// A candidate view: a label plus the [`RelationIndex`] of its decomposition of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Label of the view (e.g., the leading object type). Only used for reporting.
    pub label: String,
    /// Relation index of the view
    pub relation_index: RelationIndex,
}

impl View {
    /// Create a new [`View`]
    pub fn new<S: Into<String>>(label: S, relation_index: RelationIndex) -> Self {
        Self {
            label: label.into(),
            relation_index,
        }
    }

    /// Number of process executions of this view
    pub fn num_process_executions(&self) -> usize {
        self.relation_index.num_process_executions()
    }

    /// Number of events across all process executions of this view
    pub fn num_events(&self) -> usize {
        self.relation_index.num_events()
    }

    /// Average number of events per process execution
    pub fn avg_events_per_trace(&self) -> f64 {
        self.relation_index.avg_events_per_trace()
    }

    /// Views without process executions carry no signal and are never scored
    pub fn is_empty(&self) -> bool {
        self.num_process_executions() == 0
    }
}

///
/// The set of non-empty candidate views considered together in one selection run
///
/// Views without any process execution are dropped on construction.
/// The position of a view in the collection is its (contiguous, 0-based) view index.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewCollection {
    views: Vec<View>,
}

impl ViewCollection {
    /// Collect the given views, dropping all empty ones
    pub fn from_views(views: impl IntoIterator<Item = View>) -> Self {
        let views = views
            .into_iter()
            .filter(|v| {
                if v.is_empty() {
                    log::warn!("Dropping view '{}' without process executions", v.label);
                }
                !v.is_empty()
            })
            .collect();
        Self { views }
    }

    /// Number of (non-empty) views
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Checks if there is no view at all
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Get the view with the given index
    pub fn get(&self, index: usize) -> Option<&View> {
        self.views.get(index)
    }

    /// Iterate over all views in index order
    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.iter()
    }

    /// Labels of all views in index order
    pub fn labels(&self) -> Vec<String> {
        self.views.iter().map(|v| v.label.clone()).collect()
    }

    /// Get the inner views
    pub fn into_inner(self) -> Vec<View> {
        self.views
    }
}

impl std::ops::Index<usize> for ViewCollection {
    type Output = View;

    fn index(&self, index: usize) -> &Self::Output {
        &self.views[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_are_a_set() {
        let mut index = RelationIndex::new(3);
        assert!(index.insert(EdgeId::from(7), 2).unwrap());
        assert!(index.insert(EdgeId::from(7), 0).unwrap());
        assert!(!index.insert(EdgeId::from(7), 2).unwrap());
        assert_eq!(index.instances_of(&EdgeId::from(7)), Some(&[0, 2][..]));
        assert_eq!(index.num_edges(), 1);
    }

    #[test]
    fn instance_out_of_range_is_rejected() {
        let res = RelationIndex::from_entries(2, vec![(1u64, vec![0, 2])]);
        assert!(matches!(
            res,
            Err(ViewError::InstanceOutOfRange {
                instance: 2,
                num_process_executions: 2,
                ..
            })
        ));
    }

    #[test]
    fn edge_counts_per_instance() {
        let index =
            RelationIndex::from_entries(3, vec![(0u64, vec![0, 1, 2]), (1, vec![0, 2]), (2, vec![1, 2])])
                .unwrap();
        assert_eq!(index.edge_counts_per_instance(), vec![2, 2, 3]);
        assert_eq!(index.edge_set().len(), 3);
    }

    #[test]
    fn empty_views_are_dropped() {
        let mut index = RelationIndex::new(2);
        index.add_events(5);
        let views = ViewCollection::from_views(vec![
            View::new("orders", index),
            View::new("customers", RelationIndex::new(0)),
            View::new("items", RelationIndex::new(1)),
        ]);
        assert_eq!(views.len(), 2);
        assert_eq!(views.labels(), vec!["orders".to_string(), "items".to_string()]);
        assert_eq!(views[0].avg_events_per_trace(), 2.5);
        assert_eq!(views[1].avg_events_per_trace(), 0.0);
    }

    #[test]
    fn relation_index_json_round_trip_keeps_invariant_checkable() {
        let index = RelationIndex::from_entries(2, vec![(3u64, vec![0, 1])]).unwrap();
        let json = serde_json::to_string(&index).unwrap();
        let index2: RelationIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(index, index2);
        assert!(index2.validate().is_ok());

        let broken: RelationIndex = serde_json::from_str(
            r#"{"edges": [[3, [0, 4]]], "num_process_executions": 2, "num_events": 0}"#,
        )
        .unwrap();
        assert!(broken.validate().is_err());
    }

    #[test]
    fn repeated_or_unsorted_instances_are_rejected() {
        for instances in ["[0, 0]", "[1, 0]", "[0, 1, 1]"] {
            let index: RelationIndex = serde_json::from_str(&format!(
                r#"{{"edges": [[1, {instances}]], "num_process_executions": 2, "num_events": 3}}"#
            ))
            .unwrap();
            assert!(matches!(
                index.validate(),
                Err(ViewError::InstancesNotASet { .. })
            ));
        }
    }
}

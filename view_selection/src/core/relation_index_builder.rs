//! Building relation indices of views from process executions
use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use super::staging::{StagedView, StagingOptions, StagingWriter};
use super::view::{EdgeId, InstanceIndex, RelationIndex, View, ViewError};

///
/// Receiver of `(edge, instance)` memberships while a view is built
///
/// Implemented by [`RelationIndex`] (in-memory views) and [`StagingWriter`] (views staged on disk).
///
pub trait RelationSink {
    /// What the sink produces once the view is complete
    type Output;

    /// Open a new process execution and return its (view-local) index
    fn open_instance(&mut self) -> InstanceIndex;

    /// Record that `edge` occurs in `instance`
    ///
    /// Each `(edge, instance)` pair is recorded at most once.
    fn record(&mut self, edge: EdgeId, instance: InstanceIndex) -> Result<(), ViewError>;

    /// Complete the view
    fn finish(self, label: String, num_events: usize) -> Result<Self::Output, ViewError>;
}

impl RelationSink for RelationIndex {
    type Output = View;

    fn open_instance(&mut self) -> InstanceIndex {
        self.push_instance()
    }

    fn record(&mut self, edge: EdgeId, instance: InstanceIndex) -> Result<(), ViewError> {
        self.insert(edge, instance).map(|_| ())
    }

    fn finish(mut self, label: String, num_events: usize) -> Result<View, ViewError> {
        self.add_events(num_events);
        Ok(View::new(label, self))
    }
}

///
/// Index-building session
///
/// Owns the assignment of [`EdgeId`]s to directly-follows edges `(source event, target event)`.
/// Ids are handed out in first-seen order starting at `0` and are shared by all views built
/// through the same session, so that edges of different views can be compared by id.
///
#[derive(Debug, Default, Clone)]
pub struct RelationIndexBuilder {
    edge_ids: HashMap<(String, String), EdgeId>,
    next_edge_id: u64,
}

impl RelationIndexBuilder {
    /// Start a new session without any known edges
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id of the edge from `source` to `target`, assigning the next free id if the edge is new
    pub fn edge_id(&mut self, source: &str, target: &str) -> EdgeId {
        let next_edge_id = &mut self.next_edge_id;
        *self
            .edge_ids
            .entry((source.to_string(), target.to_string()))
            .or_insert_with(|| {
                let id = EdgeId::from(*next_edge_id);
                *next_edge_id += 1;
                id
            })
    }

    /// Look up the id of an already known edge
    pub fn lookup_edge(&self, source: &str, target: &str) -> Option<EdgeId> {
        self.edge_ids
            .get(&(source.to_string(), target.to_string()))
            .copied()
    }

    /// Number of distinct edges seen in this session
    pub fn num_edges(&self) -> usize {
        self.edge_ids.len()
    }

    /// Start building an in-memory view
    pub fn view<S: Into<String>>(&mut self, label: S) -> ViewBuilder<'_, RelationIndex> {
        ViewBuilder::new(self, label.into(), RelationIndex::new(0))
    }

    /// Start building a view whose relation index is staged on disk
    ///
    /// Building fails with [`ViewError::StagingLimitExceeded`] once the staged rows exceed the configured size.
    pub fn staged_view<S: Into<String>>(
        &mut self,
        label: S,
        options: &StagingOptions,
    ) -> Result<ViewBuilder<'_, StagingWriter>, ViewError> {
        let label = label.into();
        let writer = StagingWriter::new(&label, options)?;
        Ok(ViewBuilder::new(self, label, writer))
    }
}

///
/// Builder of a single view, borrowing the edge ids of its [`RelationIndexBuilder`] session
///
/// Every added process execution becomes the next instance of the view.
///
#[derive(Debug)]
pub struct ViewBuilder<'s, S: RelationSink> {
    session: &'s mut RelationIndexBuilder,
    label: String,
    sink: S,
    num_events: usize,
}

impl<'s, S: RelationSink> ViewBuilder<'s, S> {
    fn new(session: &'s mut RelationIndexBuilder, label: String, sink: S) -> Self {
        Self {
            session,
            label,
            sink,
            num_events: 0,
        }
    }

    /// Label of the view under construction
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Add a process execution given as an ordered sequence of event ids
    ///
    /// Consecutive events form the directly-follows edges of the process execution.
    pub fn add_trace<E: AsRef<str>>(&mut self, events: &[E]) -> Result<InstanceIndex, ViewError> {
        let instance = self.sink.open_instance();
        let mut seen: HashSet<EdgeId> = HashSet::new();
        for (source, target) in events.iter().tuple_windows() {
            let edge = self.session.edge_id(source.as_ref(), target.as_ref());
            if seen.insert(edge) {
                self.sink.record(edge, instance)?;
            }
        }
        self.num_events += events
            .iter()
            .map(AsRef::as_ref)
            .collect::<HashSet<&str>>()
            .len();
        Ok(instance)
    }

    /// Add a process execution given as a graph of events and directly-follows edges between them
    pub fn add_execution_graph<E: AsRef<str>>(
        &mut self,
        events: &[E],
        edges: &[(E, E)],
    ) -> Result<InstanceIndex, ViewError> {
        let instance = self.sink.open_instance();
        let mut seen: HashSet<EdgeId> = HashSet::new();
        for (source, target) in edges {
            let edge = self.session.edge_id(source.as_ref(), target.as_ref());
            if seen.insert(edge) {
                self.sink.record(edge, instance)?;
            }
        }
        self.num_events += events
            .iter()
            .map(AsRef::as_ref)
            .collect::<HashSet<&str>>()
            .len();
        Ok(instance)
    }

    /// Complete the view
    pub fn finish(self) -> Result<S::Output, ViewError> {
        self.sink.finish(self.label, self.num_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_ids_are_shared_across_views() {
        let mut session = RelationIndexBuilder::new();

        let mut orders = session.view("orders");
        orders.add_trace(&["place", "pay", "ship"]).unwrap();
        orders.add_trace(&["place", "cancel"]).unwrap();
        let orders = orders.finish().unwrap();

        let mut items = session.view("items");
        items.add_trace(&["pick", "ship"]).unwrap();
        items.add_trace(&["place", "pay"]).unwrap();
        let items = items.finish().unwrap();

        assert_eq!(session.num_edges(), 4);
        let place_pay = session.lookup_edge("place", "pay").unwrap();
        assert_eq!(place_pay, EdgeId::from(0));
        assert_eq!(session.lookup_edge("pick", "ship"), Some(EdgeId::from(3)));
        assert_eq!(session.lookup_edge("ship", "pick"), None);

        assert_eq!(orders.relation_index.instances_of(&place_pay), Some(&[0][..]));
        assert_eq!(items.relation_index.instances_of(&place_pay), Some(&[1][..]));
    }

    #[test]
    fn edges_are_deduplicated_per_instance() {
        let mut session = RelationIndexBuilder::new();
        let mut view = session.view("loop");
        view.add_trace(&["a", "b", "a", "b"]).unwrap();
        view.add_trace(&["a", "b"]).unwrap();
        let view = view.finish().unwrap();

        let a_b = session.lookup_edge("a", "b").unwrap();
        assert_eq!(view.relation_index.instances_of(&a_b), Some(&[0, 1][..]));
        assert_eq!(view.relation_index.edge_counts_per_instance(), vec![2, 1]);
        assert_eq!(view.num_process_executions(), 2);
        // Events are counted once per process execution they belong to
        assert_eq!(view.num_events(), 4);
    }

    #[test]
    fn execution_graphs_and_single_event_traces() {
        let mut session = RelationIndexBuilder::new();
        let mut view = session.view("graph");
        view.add_execution_graph(&["e1", "e2", "e3"], &[("e1", "e2"), ("e1", "e3")])
            .unwrap();
        view.add_trace(&["e9"]).unwrap();
        let view = view.finish().unwrap();

        assert_eq!(view.num_process_executions(), 2);
        assert_eq!(view.num_events(), 4);
        assert_eq!(view.relation_index.num_edges(), 2);
        assert_eq!(view.relation_index.edge_counts_per_instance(), vec![2, 0]);
    }
}

//! Per-thread call trees reconstructed from a collection of events

mod builder;
mod chrome;

pub use self::builder::EventTreeBuilder;

use crate::{
    category::CategoryId,
    collection::Collection,
    counter::{CounterMap, CounterValuesMap},
    event::{DataValue, TimeStamp},
    key::Key,
    thread::ThreadId,
};
use log::debug;
use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
};

/// Occurences of a marker, in timestamp order
pub type MarkerSeries = Vec<(TimeStamp, ThreadId)>;

/// Occurences of every marker
pub type MarkerValuesMap = BTreeMap<Key, MarkerSeries>;

/// Data attached to a scope, grouped by key in recording order
pub type AttributeMap = BTreeMap<Key, Vec<DataValue>>;

/// Index of a node within an EventTree
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EventNodeId(usize);

/// Occurence of a scope
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EventNode {
    /// Name of the scope
    pub key: Key,

    /// Category of the scope
    pub category: CategoryId,

    /// Start of the scope
    pub begin: TimeStamp,

    /// End of the scope
    pub end: TimeStamp,

    /// Truth that the scope was recorded as Begin/End events (as opposed to a
    /// single Timespan event)
    pub from_separate_events: bool,

    /// Nested scopes, in increasing begin time order
    pub children: Vec<EventNodeId>,

    /// Data recorded inside of this scope
    pub attributes: AttributeMap,
}

/// Hierarchical view of the scopes recorded by each thread, along with the
/// time series of counters and markers
///
/// The root node has one child per thread, named after the thread, whose
/// descendants are the scopes recorded by that thread.
#[derive(PartialEq)]
pub struct EventTree {
    /// Scope nodes, addressed by EventNodeId
    nodes: Vec<EventNode>,

    /// Root of the tree
    root: EventNodeId,

    /// Absolute value of each counter over time
    counters: CounterValuesMap,

    /// Occurences of each marker
    markers: MarkerValuesMap,
}
//
impl EventTree {
    /// Reconstruct the tree of scopes of a collection
    ///
    /// If `initial_counters` is specified, counters start from these values
    /// instead of zero.
    pub fn new(collection: &Collection, initial_counters: Option<&CounterMap>) -> Self {
        let mut builder = EventTreeBuilder::new();
        if let Some(initial_counters) = initial_counters {
            builder = builder.with_initial_counters(initial_counters.clone());
        }
        builder.create_tree(collection)
    }

    /// Assemble a tree from parts produced by EventTreeBuilder
    pub(crate) fn from_parts(
        nodes: Vec<EventNode>,
        root: EventNodeId,
        counters: CounterValuesMap,
        markers: MarkerValuesMap,
    ) -> Self {
        debug!(
            "Built event tree with {} nodes, {} counters and {} markers",
            nodes.len(),
            counters.len(),
            markers.len()
        );
        Self {
            nodes,
            root,
            counters,
            markers,
        }
    }

    /// Root of the tree
    pub fn root(&self) -> EventNodeRef<'_> {
        self.node(self.root)
    }

    /// Per-thread subtrees
    pub fn thread_nodes(&self) -> impl Iterator<Item = EventNodeRef<'_>> + Clone {
        self.root().children()
    }

    /// Subtree of a specific thread
    pub fn thread_node(&self, thread: &ThreadId) -> Option<EventNodeRef<'_>> {
        self.thread_nodes()
            .find(|node| node.key().as_str() == thread.as_str())
    }

    /// Access a node by identifier
    pub fn node(&self, id: EventNodeId) -> EventNodeRef<'_> {
        EventNodeRef { tree: self, id }
    }

    /// Raw node data
    pub(crate) fn node_data(&self, id: EventNodeId) -> &EventNode {
        &self.nodes[id.0]
    }

    /// Absolute value of each counter over time
    pub fn counters(&self) -> &CounterValuesMap {
        &self.counters
    }

    /// Time series of one counter
    pub fn counter(&self, key: Key) -> Option<&[(TimeStamp, f64)]> {
        self.counters.get(&key).map(Vec::as_slice)
    }

    /// Occurences of each marker
    pub fn markers(&self) -> &MarkerValuesMap {
        &self.markers
    }

    /// Occurences of one marker
    pub fn marker(&self, key: Key) -> Option<&[(TimeStamp, ThreadId)]> {
        self.markers.get(&key).map(Vec::as_slice)
    }

    /// Latest value of each counter that has at least one sample
    pub fn final_counter_values(&self) -> CounterMap {
        self.counters
            .iter()
            .filter_map(|(&key, series)| series.last().map(|&(_, value)| (key, value)))
            .collect()
    }

    /// Latest value of a counter, if it has any sample
    pub fn final_counter_value(&self, key: Key) -> Option<f64> {
        self.counters
            .get(&key)
            .and_then(|series| series.last())
            .map(|&(_, value)| value)
    }

    /// Latest value of a counter, or `default` if it has no sample
    pub fn final_counter_value_or(&self, key: Key, default: f64) -> f64 {
        self.final_counter_value(key).unwrap_or(default)
    }

    /// Extend this tree with the events of another collection
    ///
    /// Counters of the new collection continue from the latest values of this
    /// tree's counters.
    pub fn add(&mut self, collection: &Collection) {
        let initial_counters = self.final_counter_values();
        let added = Self::new(collection, Some(&initial_counters));
        self.merge(added);
    }

    /// Merge another tree into this one
    ///
    /// Scopes of threads that exist in both trees are appended to the scopes
    /// of this tree, other threads are added as new subtrees. Counter and
    /// marker series are merged in timestamp order.
    pub fn merge(&mut self, other: EventTree) {
        let EventTree {
            nodes,
            root: other_root,
            counters,
            markers,
        } = other;
        let mut nodes = nodes.into_iter().map(Some).collect::<Vec<_>>();
        let other_threads = nodes[other_root.0]
            .as_mut()
            .map(|root| std::mem::take(&mut root.children))
            .unwrap_or_default();

        // Only reachable scopes are moved into our arena, the other tree's
        // root and the roots of threads we already have are dropped
        for thread in other_threads {
            let Some(thread_node) = nodes[thread.0].as_mut() else {
                continue;
            };
            let key = thread_node.key;
            let existing = self.nodes[self.root.0]
                .children
                .iter()
                .copied()
                .find(|&id| self.nodes[id.0].key == key);
            match existing {
                Some(existing) => {
                    let children = std::mem::take(&mut thread_node.children);
                    let attributes = std::mem::take(&mut thread_node.attributes);
                    for child in children {
                        let child = self.adopt(&mut nodes, child);
                        self.nodes[existing.0].children.push(child);
                    }
                    let existing_node = &mut self.nodes[existing.0];
                    for (key, mut values) in attributes {
                        existing_node
                            .attributes
                            .entry(key)
                            .or_default()
                            .append(&mut values);
                    }
                    self.set_bounds_from_children(existing);
                }
                None => {
                    let thread = self.adopt(&mut nodes, thread);
                    self.nodes[self.root.0].children.push(thread);
                }
            }
        }
        self.set_bounds_from_children(self.root);

        merge_series(&mut self.counters, counters);
        merge_series(&mut self.markers, markers);
    }

    /// Move a subtree of another tree's arena into this one, returning the
    /// new id of its root
    fn adopt(&mut self, source: &mut [Option<EventNode>], root: EventNodeId) -> EventNodeId {
        let new_root = EventNodeId(self.nodes.len());
        let mut stack = vec![(root, None::<EventNodeId>)];
        while let Some((id, parent)) = stack.pop() {
            let Some(mut node) = source[id.0].take() else {
                continue;
            };
            let new_id = EventNodeId(self.nodes.len());
            if let Some(parent) = parent {
                self.nodes[parent.0].children.push(new_id);
            }
            let children = std::mem::take(&mut node.children);
            stack.extend(children.into_iter().rev().map(|child| (child, Some(new_id))));
            self.nodes.push(node);
        }
        new_root
    }

    /// Make a node span all of its children
    fn set_bounds_from_children(&mut self, id: EventNodeId) {
        if let Some((begin, end)) = span_of(&self.nodes, &self.nodes[id.0].children) {
            let node = &mut self.nodes[id.0];
            node.begin = begin;
            node.end = end;
        }
    }
}
//
impl Debug for EventTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTree")
            .field("root", &self.root())
            .field("counters", &self.counters)
            .field("markers", &self.markers)
            .finish()
    }
}

/// Time range covered by a set of nodes
pub(crate) fn span_of(nodes: &[EventNode], ids: &[EventNodeId]) -> Option<(TimeStamp, TimeStamp)> {
    let begin = ids.iter().map(|id| nodes[id.0].begin).min()?;
    let end = ids.iter().map(|id| nodes[id.0].end).max()?;
    Some((begin, end))
}

/// Merge time series, preserving timestamp order
fn merge_series<T>(
    target: &mut BTreeMap<Key, Vec<(TimeStamp, T)>>,
    source: BTreeMap<Key, Vec<(TimeStamp, T)>>,
) {
    for (key, tail) in source {
        let series = target.entry(key).or_default();
        let head = std::mem::take(series);
        *series = merge_sorted(head, tail);
    }
}

/// Two-way merge of timestamp-sorted sequences
///
/// On timestamp ties, elements of `head` come first.
pub(crate) fn merge_sorted<T>(
    head: Vec<(TimeStamp, T)>,
    tail: Vec<(TimeStamp, T)>,
) -> Vec<(TimeStamp, T)> {
    if head.is_empty() {
        return tail;
    }
    let mut merged = Vec::with_capacity(head.len() + tail.len());
    let mut head = head.into_iter().peekable();
    let mut tail = tail.into_iter().peekable();
    loop {
        let take_tail = match (head.peek(), tail.peek()) {
            (Some(h), Some(t)) => t.0 < h.0,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_tail { tail.next() } else { head.next() };
        merged.extend(next);
    }
    merged
}

/// View of a node of an EventTree
#[derive(Clone, Copy)]
pub struct EventNodeRef<'tree> {
    /// Tree which the node belongs to
    tree: &'tree EventTree,

    /// Node which we are looking at
    id: EventNodeId,
}
//
impl<'tree> EventNodeRef<'tree> {
    /// Identifier of the node within the tree
    pub fn id(&self) -> EventNodeId {
        self.id
    }

    /// Name of the scope
    pub fn key(&self) -> Key {
        self.data().key
    }

    /// Category of the scope
    pub fn category(&self) -> CategoryId {
        self.data().category
    }

    /// Start of the scope
    pub fn begin_time(&self) -> TimeStamp {
        self.data().begin
    }

    /// End of the scope
    pub fn end_time(&self) -> TimeStamp {
        self.data().end
    }

    /// Duration of the scope, including nested scopes
    pub fn duration(&self) -> TimeStamp {
        self.end_time().saturating_sub(self.begin_time())
    }

    /// Truth that the scope was recorded as separate Begin/End events
    pub fn from_separate_events(&self) -> bool {
        self.data().from_separate_events
    }

    /// Data recorded inside of the scope
    pub fn attributes(&self) -> &'tree AttributeMap {
        &self.data().attributes
    }

    /// Nested scopes, in increasing begin time order
    pub fn children(&self) -> impl DoubleEndedIterator<Item = EventNodeRef<'tree>> + Clone + 'tree {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&id| EventNodeRef { tree, id })
    }

    /// Number of nested scopes
    pub fn num_children(&self) -> usize {
        self.data().children.len()
    }

    /// Underlying node data
    fn data(&self) -> &'tree EventNode {
        self.tree.node_data(self.id)
    }
}
//
impl Debug for EventNodeRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EventNode");
        s.field("key", &self.key())
            .field("begin", &self.begin_time())
            .field("end", &self.end_time());
        if !self.attributes().is_empty() {
            s.field("attributes", self.attributes());
        }
        s.field("children", &self.children().collect::<Vec<_>>())
            .finish()
    }
}

//! Call tree where repeated occurences of a scope are accumulated

mod builder;

pub use self::builder::AggregateTreeBuilder;

use crate::{
    collection::Collection,
    event::TimeStamp,
    event_tree::EventTree,
    key::Key,
    thread::ThreadId,
};
use log::error;
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Formatter},
};
use thiserror::Error;

/// Name of the root node of every AggregateTree
const ROOT_KEY: &str = "root";

/// Thread which recorded the first occurence of an aggregated scope
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AggregateNodeId(pub ThreadId);

/// Index of a node within an AggregateTree
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AggregateNodeIndex(usize);
//
impl AggregateNodeIndex {
    /// Root of every AggregateTree
    pub const ROOT: Self = Self(0);
}

/// Accumulated contribution to a counter
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CounterContribution {
    /// Contribution of a scope and its nested scopes
    pub inclusive: f64,

    /// Contribution of a scope alone
    pub exclusive: f64,
}

/// Scope, as identified by its name and the names of its callers
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AggregateNode {
    /// Name of the scope
    key: Key,

    /// Thread which recorded the first occurence
    id: AggregateNodeId,

    /// Parent node, if any
    parent: Option<AggregateNodeIndex>,

    /// Accumulated duration of all occurences, including nested scopes
    inclusive_time: TimeStamp,

    /// Number of occurences
    count: usize,

    /// Counter contributions, by counter index
    counters: BTreeMap<usize, CounterContribution>,

    /// Nested scopes, by order of first occurence
    children: Vec<AggregateNodeIndex>,

    /// Nested scopes, by name
    children_by_key: HashMap<Key, AggregateNodeIndex>,
}
//
impl AggregateNode {
    /// Set up a node with no occurence
    fn new(key: Key, id: AggregateNodeId, parent: Option<AggregateNodeIndex>) -> Self {
        Self {
            key,
            id,
            parent,
            inclusive_time: 0,
            count: 0,
            counters: BTreeMap::new(),
            children: Vec::new(),
            children_by_key: HashMap::new(),
        }
    }
}

/// Call tree where scopes with the same name and callers are merged together,
/// along with cumulative scope durations and counter values
#[derive(Clone, PartialEq)]
pub struct AggregateTree {
    /// Aggregated scopes, the root is at AggregateNodeIndex::ROOT
    ///
    /// Children always come after their parent.
    nodes: Vec<AggregateNode>,

    /// Cumulative duration of every scope name, excluding thread roots
    event_times: BTreeMap<Key, TimeStamp>,

    /// Current value of every counter
    counters: BTreeMap<Key, f64>,

    /// Index of every counter
    counter_index_map: BTreeMap<Key, usize>,

    /// Next counter index to be allocated
    counter_index: usize,
}
//
impl AggregateTree {
    /// Set up an empty tree
    pub fn new() -> Self {
        Self {
            nodes: vec![Self::root_node()],
            event_times: BTreeMap::new(),
            counters: BTreeMap::new(),
            counter_index_map: BTreeMap::new(),
            counter_index: 0,
        }
    }

    /// Root of the tree
    pub fn root(&self) -> AggregateNodeRef<'_> {
        self.node(AggregateNodeIndex::ROOT)
    }

    /// Access a node by index
    pub fn node(&self, idx: AggregateNodeIndex) -> AggregateNodeRef<'_> {
        AggregateNodeRef { tree: self, idx }
    }

    /// Cumulative duration of every scope name
    ///
    /// Per-thread root scopes are not taken into account.
    pub fn event_times(&self) -> &BTreeMap<Key, TimeStamp> {
        &self.event_times
    }

    /// Cumulative duration of a scope name, if it was seen
    pub fn event_time(&self, key: Key) -> Option<TimeStamp> {
        self.event_times.get(&key).copied()
    }

    /// Cumulative duration of a scope name, or `default` if it was not seen
    pub fn event_time_or(&self, key: Key, default: TimeStamp) -> TimeStamp {
        self.event_time(key).unwrap_or(default)
    }

    /// Current value of every counter
    pub fn counters(&self) -> &BTreeMap<Key, f64> {
        &self.counters
    }

    /// Current value of a counter, if it was seen
    pub fn counter_value(&self, key: Key) -> Option<f64> {
        self.counters.get(&key).copied()
    }

    /// Index of every counter
    pub fn counter_index_map(&self) -> &BTreeMap<Key, usize> {
        &self.counter_index_map
    }

    /// Index of a counter, if it was registered
    pub fn counter_index(&self, key: Key) -> Option<usize> {
        self.counter_index_map.get(&key).copied()
    }

    /// Register a counter with an explicit index and current value
    ///
    /// Fails if a counter with the same name already exists or if another
    /// counter already uses this index. The tree is left unchanged then.
    pub fn add_counter(
        &mut self,
        key: Key,
        index: usize,
        total: f64,
    ) -> Result<(), CounterRegistrationError> {
        if self.counter_index_map.contains_key(&key) {
            let e = CounterRegistrationError::DuplicateName(key);
            error!("Rejected counter registration: {e}");
            return Err(e);
        }
        if let Some((&existing, _)) = self
            .counter_index_map
            .iter()
            .find(|(_, &other_index)| other_index == index)
        {
            let e = CounterRegistrationError::IndexCollision {
                key,
                index,
                existing,
            };
            error!("Rejected counter registration: {e}");
            return Err(e);
        }
        self.counter_index_map.insert(key, index);
        self.counters.insert(key, total);
        self.counter_index = self.counter_index.max(index + 1);
        Ok(())
    }

    /// Fold the scopes and counters of an EventTree and the Collection that
    /// it was built from into this tree
    pub fn append(&mut self, event_tree: &EventTree, collection: &Collection) {
        AggregateTreeBuilder::new(self, event_tree).build(collection);
    }

    /// Reset to an empty tree
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Root node data
    fn root_node() -> AggregateNode {
        AggregateNode::new(Key::new(ROOT_KEY), AggregateNodeId::default(), None)
    }

    /// Index of a counter, registering it with the next free index if needed
    pub(crate) fn counter_index_or_insert(&mut self, key: Key) -> usize {
        if let Some(index) = self.counter_index(key) {
            return index;
        }
        let index = self.counter_index;
        self.counter_index_map.insert(key, index);
        self.counter_index += 1;
        index
    }

    /// Running total of a counter
    pub(crate) fn counter_mut(&mut self, key: Key) -> &mut f64 {
        self.counters.entry(key).or_insert(0.0)
    }

    /// Record an occurence of a scope nested inside of `parent`
    pub(crate) fn append_child(
        &mut self,
        parent: AggregateNodeIndex,
        id: AggregateNodeId,
        key: Key,
        duration: TimeStamp,
    ) -> AggregateNodeIndex {
        let child = match self.nodes[parent.0].children_by_key.get(&key) {
            Some(&child) => child,
            None => {
                let child = AggregateNodeIndex(self.nodes.len());
                self.nodes.push(AggregateNode::new(key, id, Some(parent)));
                let parent = &mut self.nodes[parent.0];
                parent.children.push(child);
                parent.children_by_key.insert(key, child);
                child
            }
        };
        let node = &mut self.nodes[child.0];
        node.inclusive_time = node.inclusive_time.saturating_add(duration);
        node.count += 1;
        child
    }

    /// Child of a node with a certain name
    pub(crate) fn child_by_key(
        &self,
        parent: AggregateNodeIndex,
        key: Key,
    ) -> Option<AggregateNodeIndex> {
        self.nodes[parent.0].children_by_key.get(&key).copied()
    }

    /// Attribute a counter delta to a scope
    pub(crate) fn add_counter_contribution(
        &mut self,
        idx: AggregateNodeIndex,
        counter_index: usize,
        value: f64,
    ) {
        let contribution = self.nodes[idx.0]
            .counters
            .entry(counter_index)
            .or_default();
        contribution.exclusive += value;
        contribution.inclusive += value;
    }

    /// Recompute inclusive counter values from exclusive ones
    pub(crate) fn calculate_inclusive_counter_values(&mut self) {
        for node in &mut self.nodes {
            for contribution in node.counters.values_mut() {
                contribution.inclusive = contribution.exclusive;
            }
        }
        // Children come after their parent, so a reverse walk sees every
        // node after all of its descendants
        for idx in (1..self.nodes.len()).rev() {
            let Some(parent) = self.nodes[idx].parent else {
                continue;
            };
            let totals = self.nodes[idx]
                .counters
                .iter()
                .map(|(&counter, contribution)| (counter, contribution.inclusive))
                .collect::<Vec<_>>();
            let parent_counters = &mut self.nodes[parent.0].counters;
            for (counter, inclusive) in totals {
                parent_counters.entry(counter).or_default().inclusive += inclusive;
            }
        }
    }
}
//
impl Debug for AggregateTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateTree")
            .field("root", &self.root())
            .field("event_times", &self.event_times)
            .field("counters", &self.counters)
            .field("counter_index_map", &self.counter_index_map)
            .finish()
    }
}
//
impl Default for AggregateTree {
    fn default() -> Self {
        Self::new()
    }
}

/// View of a node of an AggregateTree
#[derive(Clone, Copy)]
pub struct AggregateNodeRef<'tree> {
    /// Tree which the node belongs to
    tree: &'tree AggregateTree,

    /// Node which we are looking at
    idx: AggregateNodeIndex,
}
//
impl<'tree> AggregateNodeRef<'tree> {
    /// Index of the node within the tree
    pub fn index(&self) -> AggregateNodeIndex {
        self.idx
    }

    /// Name of the scope
    pub fn key(&self) -> Key {
        self.data().key
    }

    /// Thread which recorded the first occurence of the scope
    pub fn id(&self) -> &'tree AggregateNodeId {
        &self.data().id
    }

    /// Number of occurences of the scope
    pub fn count(&self) -> usize {
        self.data().count
    }

    /// Accumulated duration, including nested scopes
    pub fn inclusive_time(&self) -> TimeStamp {
        self.data().inclusive_time
    }

    /// Accumulated duration, excluding nested scopes
    pub fn exclusive_time(&self) -> TimeStamp {
        let children_time = self
            .children()
            .fold(0, |acc: TimeStamp, child| acc.saturating_add(child.inclusive_time()));
        self.inclusive_time().saturating_sub(children_time).max(0)
    }

    /// Contribution to a counter, including nested scopes
    pub fn inclusive_counter_value(&self, counter_index: usize) -> f64 {
        self.counter(counter_index).inclusive
    }

    /// Contribution to a counter, excluding nested scopes
    pub fn exclusive_counter_value(&self, counter_index: usize) -> f64 {
        self.counter(counter_index).exclusive
    }

    /// Parent scope, if this is not the root
    pub fn parent(&self) -> Option<AggregateNodeRef<'tree>> {
        self.data().parent.map(|idx| self.tree.node(idx))
    }

    /// Nested scopes, by order of first occurence
    pub fn children(&self) -> impl DoubleEndedIterator<Item = AggregateNodeRef<'tree>> + Clone + 'tree {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&idx| AggregateNodeRef { tree, idx })
    }

    /// Nested scope with a certain name
    pub fn child(&self, key: Key) -> Option<AggregateNodeRef<'tree>> {
        self.tree
            .child_by_key(self.idx, key)
            .map(|idx| self.tree.node(idx))
    }

    /// Number of nested scopes
    pub fn num_children(&self) -> usize {
        self.data().children.len()
    }

    /// Contribution to a counter
    fn counter(&self, counter_index: usize) -> CounterContribution {
        self.data()
            .counters
            .get(&counter_index)
            .copied()
            .unwrap_or_default()
    }

    /// Underlying node data
    fn data(&self) -> &'tree AggregateNode {
        &self.tree.nodes[self.idx.0]
    }
}
//
impl Debug for AggregateNodeRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AggregateNode");
        s.field("key", &self.key())
            .field("count", &self.count())
            .field("inclusive_time", &self.inclusive_time());
        if !self.data().counters.is_empty() {
            s.field("counters", &self.data().counters);
        }
        s.field("children", &self.children().collect::<Vec<_>>())
            .finish()
    }
}

/// What can go wrong while registering a counter
#[derive(Error, Debug, PartialEq)]
pub enum CounterRegistrationError {
    /// A counter with this name already exists
    #[error("counter {0} is already registered")]
    DuplicateName(Key),

    /// Another counter already uses this index
    #[error("cannot register counter {key} at index {index}, which is used by counter {existing}")]
    IndexCollision {
        /// Counter that was being registered
        key: Key,

        /// Requested index
        index: usize,

        /// Counter which already uses this index
        existing: Key,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collection::tests::collection, event::Event};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    /// Build an event tree and aggregate it into a fresh aggregate tree
    fn aggregate(threads: Vec<(&str, Vec<Event>)>) -> (AggregateTree, EventTree, Collection) {
        let collection = collection(threads);
        let event_tree = EventTree::new(&collection, None);
        let mut aggregate = AggregateTree::new();
        aggregate.append(&event_tree, &collection);
        (aggregate, event_tree, collection)
    }

    #[test]
    fn repeated_calls_are_accumulated() {
        let foo = Key::new("AggFoo");
        let (aggregate, _, _) = aggregate(vec![(
            "AggMain",
            vec![Event::timespan(foo, 10, 20), Event::timespan(foo, 30, 45)],
        )]);

        let root = aggregate.root();
        assert_eq!(root.num_children(), 1);
        let main = root.child(Key::new("AggMain")).unwrap();
        assert_eq!(main.id(), &AggregateNodeId(ThreadId::new("AggMain")));
        assert_eq!(main.num_children(), 1);
        let foo_node = main.child(foo).unwrap();
        assert_eq!(foo_node.count(), 2);
        assert_eq!(foo_node.inclusive_time(), 25);
        assert_eq!(foo_node.exclusive_time(), 25);
        assert_eq!(foo_node.parent().map(|p| p.key()), Some(main.key()));

        // Per-thread roots do not contribute to event times
        assert_eq!(aggregate.event_time(foo), Some(25));
        assert_eq!(aggregate.event_time(Key::new("AggMain")), None);
        assert_eq!(aggregate.event_time_or(Key::new("AggMain"), -1), -1);
        assert_eq!(aggregate.event_times().len(), 1);
    }

    #[test]
    fn exclusive_time() {
        let (aggregate, _, _) = aggregate(vec![(
            "Main",
            vec![
                Event::begin("ExclOuter", 0),
                Event::timespan("ExclInner", 10, 40),
                Event::end("ExclOuter", 100),
            ],
        )]);
        let main = aggregate.root().child(Key::new("Main")).unwrap();
        let outer = main.child(Key::new("ExclOuter")).unwrap();
        assert_eq!(outer.inclusive_time(), 100);
        assert_eq!(outer.exclusive_time(), 70);
        assert_eq!(main.exclusive_time(), 0);
        assert_eq!(aggregate.event_time(Key::new("ExclInner")), Some(30));
    }

    #[test]
    fn counter_attribution() {
        let allocs = Key::new("AggAllocs");
        let memory = Key::new("AggMemory");
        let threads = vec![(
            "Main",
            vec![
                Event::begin("AttrOuter", 0),
                Event::counter_delta(allocs, 5, 2.0),
                Event::timespan("AttrInner", 10, 20),
                Event::counter_delta(allocs, 15, 3.0),
                Event::counter_value(memory, 16, 100.0),
                Event::end("AttrOuter", 30),
            ],
        )];
        let (mut aggregate, event_tree, collection) = aggregate(threads);
        let idx = 0;
        assert_eq!(aggregate.counter_index(allocs), Some(idx));
        assert_eq!(aggregate.counter_index(memory), Some(1));
        assert_eq!(aggregate.counter_value(allocs), Some(5.0));
        assert_eq!(aggregate.counter_value(memory), Some(100.0));

        let check = |aggregate: &AggregateTree, factor: f64| {
            let root = aggregate.root();
            let main = root.child(Key::new("Main")).unwrap();
            let outer = main.child(Key::new("AttrOuter")).unwrap();
            let inner = outer.child(Key::new("AttrInner")).unwrap();
            assert_eq!(inner.exclusive_counter_value(idx), 3.0 * factor);
            assert_eq!(inner.inclusive_counter_value(idx), 3.0 * factor);
            assert_eq!(outer.exclusive_counter_value(idx), 2.0 * factor);
            assert_eq!(outer.inclusive_counter_value(idx), 5.0 * factor);
            assert_eq!(main.exclusive_counter_value(idx), 0.0);
            assert_eq!(main.inclusive_counter_value(idx), 5.0 * factor);
            assert_eq!(root.inclusive_counter_value(idx), 5.0 * factor);
        };
        check(&aggregate, 1.0);

        // Appending again accumulates without double counting
        aggregate.append(&event_tree, &collection);
        check(&aggregate, 2.0);
        assert_eq!(aggregate.counter_value(allocs), Some(10.0));
        assert_eq!(aggregate.counter_value(memory), Some(100.0));
    }

    #[test]
    fn counter_index_stability() {
        let x = Key::new("IndexX");
        let y = Key::new("IndexY");
        let z = Key::new("IndexZ");
        let w = Key::new("IndexW");
        let (mut aggregate, _, _) = aggregate(vec![(
            "Main",
            vec![
                Event::counter_delta(x, 1, 1.0),
                Event::counter_delta(y, 2, 1.0),
            ],
        )]);
        assert_eq!(aggregate.counter_index(x), Some(0));
        assert_eq!(aggregate.counter_index(y), Some(1));

        assert_eq!(
            aggregate.add_counter(z, 0, 1.0),
            Err(CounterRegistrationError::IndexCollision {
                key: z,
                index: 0,
                existing: x
            })
        );
        assert_matches!(
            aggregate.add_counter(x, 5, 1.0),
            Err(CounterRegistrationError::DuplicateName(key)) => assert_eq!(key, x)
        );
        assert_eq!(aggregate.counter_index(x), Some(0));
        assert_eq!(aggregate.counter_index(y), Some(1));
        assert_eq!(aggregate.counter_index(z), None);

        // Explicit registration moves the allocator past the requested index
        assert_eq!(aggregate.add_counter(z, 4, 7.0), Ok(()));
        assert_eq!(aggregate.counter_value(z), Some(7.0));
        assert_eq!(aggregate.counter_index_or_insert(w), 5);
        assert_eq!(aggregate.counter_index_map().len(), 4);
    }

    #[test]
    fn clear() {
        let (mut aggregate, _, _) = aggregate(vec![(
            "Main",
            vec![
                Event::timespan("ClearScope", 1, 2),
                Event::counter_delta("ClearCounter", 1, 1.0),
            ],
        )]);
        assert_eq!(aggregate.root().num_children(), 1);
        aggregate.clear();
        assert_eq!(aggregate, AggregateTree::new());
        assert_eq!(aggregate.root().num_children(), 0);
        assert!(aggregate.event_times().is_empty());
        assert!(aggregate.counters().is_empty());
        assert_eq!(aggregate.counter_index_or_insert(Key::new("ClearCounter")), 0);
    }

    #[test]
    fn extreme_timestamps_saturate() {
        let document = serde_json::json!([
            {"ph": "X", "name": "AggHuge", "tid": 1, "ts": -5.0e15, "dur": 1.0e16}
        ]);
        let collection = crate::json::collection_from_json(&document).unwrap();
        let event_tree = EventTree::new(&collection, None);
        let mut aggregate = AggregateTree::new();
        aggregate.append(&event_tree, &collection);

        let thread = aggregate.root().children().next().unwrap();
        let huge = thread.child(Key::new("AggHuge")).unwrap();
        assert_eq!(huge.inclusive_time(), TimeStamp::MAX);
        assert_eq!(huge.exclusive_time(), TimeStamp::MAX);
        assert_eq!(aggregate.event_time(Key::new("AggHuge")), Some(TimeStamp::MAX));

        let scope = event_tree.thread_nodes().next().unwrap().children().next().unwrap();
        assert_eq!(scope.duration(), TimeStamp::MAX);
        let trace = event_tree.to_chrome_trace();
        let dur = trace["traceEvents"][0]["dur"].as_f64().unwrap();
        assert!(dur > 0.0);
    }
}

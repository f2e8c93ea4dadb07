//! Reconstruction of an EventTree from a flat stream of events

use super::{span_of, AttributeMap, EventNode, EventNodeId, EventTree, MarkerValuesMap};
use crate::{
    category::CategoryId,
    collection::{Collection, CollectionVisitor},
    counter::{CategoryFilter, CounterAccumulator, CounterMap},
    event::{DataValue, Event, EventData, TimeStamp},
    key::Key,
    thread::ThreadId,
};
use log::trace;
use std::{collections::HashMap, sync::Arc};

/// Name of the root node of every EventTree
const ROOT_KEY: &str = "root";

/// Scope whose end has not been seen yet
#[derive(Debug)]
struct PendingNode {
    /// Name of the scope
    key: Key,

    /// Category of the scope
    category: CategoryId,

    /// Start of the scope
    start: TimeStamp,

    /// Closed scopes nested inside of this one, in increasing begin order
    children: Vec<EventNodeId>,

    /// Data recorded inside of this scope, in recording order
    attributes: Vec<PendingAttribute>,
}
//
impl PendingNode {
    /// Start a scope with no children
    fn new(key: Key, category: CategoryId, start: TimeStamp) -> Self {
        Self {
            key,
            category,
            start,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Turn into a node of the tree
    fn close(
        self,
        nodes: &mut Vec<EventNode>,
        end: TimeStamp,
        from_separate_events: bool,
    ) -> EventNodeId {
        let mut attributes = AttributeMap::new();
        for attribute in self.attributes {
            attributes
                .entry(attribute.key)
                .or_default()
                .push(attribute.value);
        }
        let id = EventNodeId(nodes.len());
        nodes.push(EventNode {
            key: self.key,
            category: self.category,
            begin: self.start,
            end,
            from_separate_events,
            children: self.children,
            attributes,
        });
        id
    }

    /// Turn into a node that spans all of its children
    ///
    /// Without children, this is a zero-duration node at `fallback`.
    fn close_around_children(self, nodes: &mut Vec<EventNode>, fallback: TimeStamp) -> EventNodeId {
        let (begin, end) = span_of(nodes, &self.children).unwrap_or((fallback, fallback));
        let id = self.close(nodes, end, true);
        nodes[id.0].begin = begin;
        id
    }
}

/// Datum recorded inside of a pending scope
#[derive(Debug)]
struct PendingAttribute {
    /// When the datum was recorded
    time: TimeStamp,

    /// Name of the datum
    key: Key,

    /// Value of the datum
    value: DataValue,
}

/// Mechanism to build an EventTree from a Collection
#[derive(Default)]
pub struct EventTreeBuilder {
    /// Closed scopes
    nodes: Vec<EventNode>,

    /// Root node of each thread visited so far
    thread_roots: Vec<EventNodeId>,

    /// Scopes of the current thread whose end has not been seen yet
    ///
    /// The bottom of the stack is the thread's root scope.
    stack: Vec<PendingNode>,

    /// Markers seen so far
    markers: HashMap<Key, Vec<(TimeStamp, ThreadId)>>,

    /// Turns counter events into time series
    counter_accumulator: CounterAccumulator,

    /// Optional restriction on the categories of accepted events
    filter: Option<CategoryFilter>,
}
//
impl EventTreeBuilder {
    /// Prepare to build an EventTree
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counters from these values instead of zero
    pub fn with_initial_counters(mut self, initial_counters: CounterMap) -> Self {
        self.counter_accumulator.set_current_values(initial_counters);
        self
    }

    /// Only take into account events from categories accepted by `filter`
    pub fn with_category_filter(
        mut self,
        filter: impl Fn(CategoryId) -> bool + Send + Sync + 'static,
    ) -> Self {
        let filter: CategoryFilter = Arc::new(filter);
        self.counter_accumulator
            .set_category_filter(Some(filter.clone()));
        self.filter = Some(filter);
        self
    }

    /// Build the EventTree of a collection
    pub fn create_tree(mut self, collection: &Collection) -> EventTree {
        collection.iterate(&mut self);
        self.counter_accumulator.update(collection);

        // Add the root node, spanning all threads
        let root_id = EventNodeId(self.nodes.len());
        let (begin, end) = span_of(&self.nodes, &self.thread_roots).unwrap_or_default();
        self.nodes.push(EventNode {
            key: Key::new(ROOT_KEY),
            category: CategoryId::DEFAULT,
            begin,
            end,
            from_separate_events: true,
            children: std::mem::take(&mut self.thread_roots),
            attributes: AttributeMap::new(),
        });

        let markers: MarkerValuesMap = self.markers.into_iter().collect();
        EventTree::from_parts(
            self.nodes,
            root_id,
            self.counter_accumulator.into_counters(),
            markers,
        )
    }

    /// Handle the end of a scope
    fn on_end(&mut self, key: Key, category: CategoryId, time: TimeStamp) {
        let matches = self.stack.len() > 1 && self.stack.last().map(|top| top.key) == Some(key);
        if matches {
            if let Some(pending) = self.stack.pop() {
                let id = pending.close(&mut self.nodes, time, true);
                self.attach(id);
            }
            return;
        }

        // No matching Begin event was seen, most likely because recording
        // started inside of this scope: everything recorded so far at the
        // current level is assumed to belong to it.
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        trace!("Recovering from unmatched end of scope {key} at {time}");
        let wrapper = PendingNode {
            key,
            category,
            start: time,
            children: std::mem::take(&mut top.children),
            attributes: std::mem::take(&mut top.attributes),
        };
        let id = wrapper.close_around_children(&mut self.nodes, time);
        self.attach(id);
    }

    /// Handle a complete scope
    fn on_timespan(&mut self, key: Key, category: CategoryId, start: TimeStamp, end: TimeStamp) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };

        // Adopt the scopes and data which were recorded during the timespan
        let nodes = &self.nodes;
        let split = top
            .children
            .partition_point(|child| nodes[child.0].begin < start);
        let children = top.children.split_off(split);
        let (attributes, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut top.attributes)
            .into_iter()
            .partition(|attribute| attribute.time >= start);
        top.attributes = kept;

        let pending = PendingNode {
            key,
            category,
            start,
            children,
            attributes,
        };
        let end = if start == 0 { 0 } else { end };
        let id = pending.close(&mut self.nodes, end, false);
        self.attach(id);
    }

    /// Append a closed node to the children of the current scope
    fn attach(&mut self, id: EventNodeId) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(id);
        }
    }
}
//
impl CollectionVisitor for EventTreeBuilder {
    fn on_begin_thread(&mut self, thread: &ThreadId) {
        self.stack.clear();
        self.stack.push(PendingNode::new(
            Key::new(thread.as_str()),
            CategoryId::DEFAULT,
            0,
        ));
    }

    fn on_end_thread(&mut self, thread: &ThreadId) {
        // Close scopes whose end was never recorded
        while self.stack.len() > 1 {
            let Some(pending) = self.stack.pop() else {
                break;
            };
            trace!(
                "Closing incomplete scope {} of thread {thread} at end of collection",
                pending.key
            );
            let start = pending.start;
            let id = pending.close_around_children(&mut self.nodes, start);
            let node = &mut self.nodes[id.0];
            node.begin = start;
            node.end = node.end.max(start);
            self.attach(id);
        }

        // The thread's root node spans all of its scopes
        if let Some(root) = self.stack.pop() {
            let id = root.close_around_children(&mut self.nodes, 0);
            self.thread_roots.push(id);
        }
    }

    fn on_end_collection(&mut self) {
        self.stack.clear();
        for occurences in self.markers.values_mut() {
            occurences.sort_by_key(|&(time, _)| time);
        }
    }

    fn accepts_category(&self, category: CategoryId) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(category))
    }

    fn on_event(&mut self, thread: &ThreadId, key: Key, event: &Event) {
        match &event.data {
            EventData::Begin(time) => {
                self.stack
                    .push(PendingNode::new(key, event.category, *time));
            }
            EventData::End(time) => self.on_end(key, event.category, *time),
            EventData::Timespan { start, end } => {
                self.on_timespan(key, event.category, *start, *end)
            }
            EventData::Marker(time) => {
                self.markers
                    .entry(key)
                    .or_default()
                    .push((*time, thread.clone()));
            }
            EventData::ScopeData { time, value } => {
                if let Some(top) = self.stack.last_mut() {
                    top.attributes.push(PendingAttribute {
                        time: *time,
                        key,
                        value: value.clone(),
                    });
                }
            }
            // Counters are handled by the CounterAccumulator
            EventData::CounterDelta { .. }
            | EventData::CounterValue { .. }
            | EventData::Unknown(_) => {}
        }
    }
}

//! Folding of EventTrees into an AggregateTree

use super::{AggregateNodeId, AggregateNodeIndex, AggregateTree};
use crate::{
    collection::{Collection, CollectionVisitor},
    event::{Event, EventData, TimeStamp},
    event_tree::EventTree,
    key::Key,
    thread::ThreadId,
};
use log::{debug, trace};

/// Mechanism to fold an EventTree and its source Collection into an
/// AggregateTree
pub struct AggregateTreeBuilder<'a> {
    /// Tree that is being extended
    aggregate: &'a mut AggregateTree,

    /// Tree whose scopes are being aggregated
    event_tree: &'a EventTree,
}
//
impl<'a> AggregateTreeBuilder<'a> {
    /// Prepare to fold `event_tree` into `aggregate`
    pub fn new(aggregate: &'a mut AggregateTree, event_tree: &'a EventTree) -> Self {
        Self {
            aggregate,
            event_tree,
        }
    }

    /// Aggregate the scopes of the event tree, then the counter events of
    /// the collection that it was built from
    pub fn build(mut self, collection: &Collection) {
        self.create_aggregate_nodes();
        collection.iterate(&mut self);
        self.aggregate.calculate_inclusive_counter_values();
        debug!(
            "Aggregate tree now has {} nodes, {} timed scopes and {} counters",
            self.aggregate.nodes.len(),
            self.aggregate.event_times.len(),
            self.aggregate.counters.len()
        );
    }

    /// Accumulate every scope of the event tree into the aggregate tree
    fn create_aggregate_nodes(&mut self) {
        let event_tree = self.event_tree;
        let mut tree_stack = vec![(event_tree.root().id(), 0)];
        let mut agg_stack = vec![AggregateNodeIndex::ROOT];
        let mut thread = AggregateNodeId::default();
        while let Some(&(node, next_child)) = tree_stack.last() {
            let Some(&child) = event_tree.node_data(node).children.get(next_child) else {
                tree_stack.pop();
                agg_stack.pop();
                continue;
            };
            let top = tree_stack.len() - 1;
            tree_stack[top].1 += 1;

            let child_data = event_tree.node_data(child);
            let duration = child_data.end.saturating_sub(child_data.begin).max(0);
            if agg_stack.len() > 1 {
                if duration > 0 {
                    let total = self.aggregate.event_times.entry(child_data.key).or_insert(0);
                    *total = total.saturating_add(duration);
                }
            } else {
                thread = AggregateNodeId(ThreadId::new(child_data.key.as_str()));
            }

            let parent = *agg_stack.last().unwrap_or(&AggregateNodeIndex::ROOT);
            let agg_child =
                self.aggregate
                    .append_child(parent, thread.clone(), child_data.key, duration);
            tree_stack.push((child, 0));
            agg_stack.push(agg_child);
        }
    }

    /// Find the aggregate node of the scope that was active on some thread at
    /// some point in time
    ///
    /// Returns None if the thread is unknown or if the path of the active
    /// scope does not exist in the aggregate tree.
    pub fn find_aggregate_node(
        &self,
        thread: &ThreadId,
        time: TimeStamp,
    ) -> Option<AggregateNodeIndex> {
        let thread_node = self.event_tree.thread_node(thread)?;

        // Descend into the scopes that were active at this time
        let mut path = vec![thread_node.key()];
        let mut node = thread_node.id();
        loop {
            let children = &self.event_tree.node_data(node).children;
            let first_active = children
                .partition_point(|&child| self.event_tree.node_data(child).end < time);
            match children.get(first_active) {
                Some(&child) if self.event_tree.node_data(child).begin <= time => {
                    path.push(self.event_tree.node_data(child).key);
                    node = child;
                }
                _ => break,
            }
        }

        // Follow the same path through the aggregate tree
        path.into_iter().try_fold(AggregateNodeIndex::ROOT, |parent, key| {
            self.aggregate.child_by_key(parent, key)
        })
    }

    /// Register a counter and update its running total
    fn process_counter(&mut self, key: Key, value: f64, is_delta: bool) -> usize {
        let index = self.aggregate.counter_index_or_insert(key);
        let total = self.aggregate.counter_mut(key);
        if is_delta {
            *total += value;
        } else {
            *total = value;
        }
        index
    }
}
//
impl CollectionVisitor for AggregateTreeBuilder<'_> {
    fn on_event(&mut self, thread: &ThreadId, key: Key, event: &Event) {
        match event.data {
            EventData::CounterDelta { time, value } => {
                let index = self.process_counter(key, value, true);
                match self.find_aggregate_node(thread, time) {
                    Some(node) => self.aggregate.add_counter_contribution(node, index, value),
                    None => trace!("No active scope for {key} delta at {time} on thread {thread}"),
                }
            }
            EventData::CounterValue { value, .. } => {
                self.process_counter(key, value, false);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::tests::collection;
    use pretty_assertions::assert_eq;

    #[test]
    fn find_aggregate_node() {
        let collection = collection(vec![(
            "FindMain",
            vec![
                Event::begin("FindOuter", 100),
                Event::timespan("FindInner", 110, 120),
                Event::timespan("FindLater", 130, 140),
                Event::end("FindOuter", 200),
            ],
        )]);
        let event_tree = EventTree::new(&collection, None);
        let mut aggregate = AggregateTree::new();

        // Nothing can be found before the scopes are aggregated
        let main = ThreadId::new("FindMain");
        assert_eq!(
            AggregateTreeBuilder::new(&mut aggregate, &event_tree).find_aggregate_node(&main, 115),
            None
        );

        aggregate.append(&event_tree, &collection);
        let builder = AggregateTreeBuilder::new(&mut aggregate, &event_tree);
        let key_at = |time| {
            builder
                .find_aggregate_node(&main, time)
                .map(|idx| builder.aggregate.node(idx).key().as_str())
        };
        assert_eq!(key_at(115), Some("FindInner"));
        assert_eq!(key_at(120), Some("FindInner"));
        assert_eq!(key_at(125), Some("FindOuter"));
        assert_eq!(key_at(130), Some("FindLater"));
        assert_eq!(key_at(105), Some("FindOuter"));
        assert_eq!(key_at(50), Some("FindMain"));
        assert_eq!(key_at(300), Some("FindMain"));
        assert_eq!(
            builder.find_aggregate_node(&ThreadId::new("FindNowhere"), 115),
            None
        );
    }

    #[test]
    fn deltas_outside_of_scopes() {
        let lost = Key::new("OutsideDelta");
        let collection = collection(vec![(
            "OutsideMain",
            vec![Event::counter_delta(lost, 5, 1.0)],
        )]);
        let event_tree = EventTree::new(&collection, None);
        let mut aggregate = AggregateTree::new();
        aggregate.append(&event_tree, &collection);

        // Threads without any scope still get a per-thread node
        assert_eq!(aggregate.counter_value(lost), Some(1.0));
        let index = aggregate.counter_index(lost).unwrap();
        let main = aggregate.root().child(Key::new("OutsideMain")).unwrap();
        assert_eq!(main.exclusive_counter_value(index), 1.0);
        assert_eq!(aggregate.root().inclusive_counter_value(index), 1.0);
    }
}

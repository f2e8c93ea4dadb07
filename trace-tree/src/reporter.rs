//! Incremental processing of the collections produced by instrumentation

use crate::{
    aggregate_tree::AggregateTree,
    collection::Collection,
    event_tree::EventTree,
    serialization::{self, SerializationError},
};
use crossbeam_deque::Injector;
use log::debug;
use std::{io::Write, sync::Arc};

/// Producer of completed collections
pub trait DataSource {
    /// Collections produced since the last call, in production order
    fn consume_data(&self) -> Vec<Collection>;
}
//
impl<S: DataSource + ?Sized> DataSource for Arc<S> {
    fn consume_data(&self) -> Vec<Collection> {
        (**self).consume_data()
    }
}

/// Concurrent hand-off point between instrumented threads and a reporter
///
/// Pushing a collection transfers its ownership to the queue, so producers
/// cannot append events to it afterwards.
#[derive(Default)]
pub struct CollectionQueue {
    /// Collections that were not consumed yet
    queue: Injector<Collection>,
}
//
impl CollectionQueue {
    /// Set up an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over a completed collection
    pub fn push(&self, collection: Collection) {
        self.queue.push(collection);
    }

    /// Truth that no collection is waiting to be consumed
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
//
impl DataSource for CollectionQueue {
    fn consume_data(&self) -> Vec<Collection> {
        std::iter::from_fn(|| {
            std::iter::repeat_with(|| self.queue.steal())
                // Loop while a steal operation needs to be retried
                .find(|s| !s.is_retry())
                .and_then(|s| s.success())
        })
        .collect()
    }
}

/// Consumer of the collections pulled by a ReporterBase
pub trait CollectionProcessor {
    /// Take a new collection into account
    fn process_collection(&mut self, collection: &Collection);
}

/// Pulls collections from a DataSource, hands them over to a processor, and
/// keeps them around so that they can be written out later
pub struct ReporterBase<S: DataSource> {
    /// Where collections come from
    source: S,

    /// Collections processed so far, in processing order
    processed: Vec<Arc<Collection>>,
}
//
impl<S: DataSource> ReporterBase<S> {
    /// Set up a reporter that pulls collections from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            processed: Vec::new(),
        }
    }

    /// Process the collections produced since the last update
    ///
    /// Returns how many new collections were processed.
    pub fn update(&mut self, processor: &mut impl CollectionProcessor) -> usize {
        let new_collections = self.source.consume_data();
        let num_new = new_collections.len();
        for collection in new_collections {
            processor.process_collection(&collection);
            self.processed.push(Arc::new(collection));
        }
        debug!(
            "Processed {num_new} new collections, {} in total",
            self.processed.len()
        );
        num_new
    }

    /// Collections processed so far
    pub fn processed_collections(&self) -> &[Arc<Collection>] {
        &self.processed
    }

    /// Write all processed collections as a Chrome trace document
    pub fn serialize_processed_collections(
        &self,
        writer: impl Write,
    ) -> Result<(), SerializationError> {
        let collections = self
            .processed
            .iter()
            .map(|collection| &**collection)
            .collect::<Vec<_>>();
        serialization::write(writer, &collections)
    }

    /// Forget about processed collections
    pub fn clear(&mut self) {
        self.processed.clear();
    }
}

/// Processor that maintains an EventTree spanning all processed collections
/// along with the matching AggregateTree
#[derive(Debug, Default)]
pub struct TreeReporter {
    /// Scopes recorded so far, if any collection was processed
    event_tree: Option<EventTree>,

    /// Aggregated scopes recorded so far
    aggregate_tree: AggregateTree,
}
//
impl TreeReporter {
    /// Set up a reporter with no data
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes recorded so far
    pub fn event_tree(&self) -> Option<&EventTree> {
        self.event_tree.as_ref()
    }

    /// Aggregated scopes recorded so far
    pub fn aggregate_tree(&self) -> &AggregateTree {
        &self.aggregate_tree
    }

    /// Forget about recorded data
    pub fn clear(&mut self) {
        self.event_tree = None;
        self.aggregate_tree.clear();
    }
}
//
impl CollectionProcessor for TreeReporter {
    fn process_collection(&mut self, collection: &Collection) {
        // Counters continue from where the previous collections left them
        let initial_counters = self.event_tree.as_ref().map(EventTree::final_counter_values);
        let tree = EventTree::new(collection, initial_counters.as_ref());
        self.aggregate_tree.append(&tree, collection);
        match &mut self.event_tree {
            Some(event_tree) => event_tree.merge(tree),
            None => self.event_tree = Some(tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collection::tests::collection, event::Event, key::Key, thread::ThreadId};
    use pretty_assertions::assert_eq;

    #[test]
    fn queue_hand_off() {
        let queue = CollectionQueue::new();
        assert!(queue.is_empty());
        queue.push(collection(vec![("Q1", vec![Event::marker("QueueA", 1)])]));
        queue.push(collection(vec![("Q2", vec![Event::marker("QueueB", 2)])]));
        assert!(!queue.is_empty());

        let consumed = queue.consume_data();
        assert_eq!(consumed.len(), 2);
        assert!(consumed[0].thread(&ThreadId::new("Q1")).is_some());
        assert!(consumed[1].thread(&ThreadId::new("Q2")).is_some());
        assert!(queue.is_empty());
        assert!(queue.consume_data().is_empty());
    }

    #[test]
    fn tree_reporter() {
        let counter = Key::new("ReporterCounter");
        let queue = Arc::new(CollectionQueue::new());
        let mut reporter = ReporterBase::new(queue.clone());
        let mut trees = TreeReporter::new();
        assert_eq!(reporter.update(&mut trees), 0);
        assert!(trees.event_tree().is_none());

        queue.push(collection(vec![(
            "Main",
            vec![
                Event::begin("ReporterScope", 0),
                Event::counter_delta(counter, 5, 2.0),
                Event::end("ReporterScope", 10),
            ],
        )]));
        assert_eq!(reporter.update(&mut trees), 1);
        queue.push(collection(vec![(
            "Main",
            vec![
                Event::begin("ReporterScope", 20),
                Event::counter_delta(counter, 25, 3.0),
                Event::end("ReporterScope", 40),
            ],
        )]));
        assert_eq!(reporter.update(&mut trees), 1);
        assert_eq!(reporter.processed_collections().len(), 2);

        let event_tree = trees.event_tree().unwrap();
        assert_eq!(event_tree.counter(counter).unwrap(), &[(5, 2.0), (25, 5.0)]);
        let main = event_tree.thread_node(&ThreadId::new("Main")).unwrap();
        assert_eq!(main.num_children(), 2);

        let aggregate = trees.aggregate_tree();
        assert_eq!(aggregate.event_time(Key::new("ReporterScope")), Some(30));
        assert_eq!(aggregate.counter_value(counter), Some(5.0));

        let mut bytes = Vec::new();
        reporter.serialize_processed_collections(&mut bytes).unwrap();
        let read_back = serialization::read(bytes.as_slice()).unwrap();
        assert_eq!(
            read_back
                .thread(&ThreadId::new("Main"))
                .map(|events| events.len()),
            Some(6)
        );

        reporter.clear();
        trees.clear();
        assert!(reporter.processed_collections().is_empty());
        assert!(trees.event_tree().is_none());
        assert_eq!(trees.aggregate_tree(), &AggregateTree::new());
    }
}

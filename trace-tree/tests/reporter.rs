use pretty_assertions::assert_eq;
use std::{sync::Arc, thread};
use trace_tree::{
    Collection, CollectionQueue, Event, Key, ReporterBase, ThreadId, TreeReporter,
};

const NUM_PRODUCERS: usize = 4;
const COLLECTIONS_PER_PRODUCER: usize = 10;

/// One unit of work, as recorded by a producer thread
fn task(producer: usize, iteration: usize) -> Collection {
    let start = (iteration * 100 + 1) as i64;
    let mut collection = Collection::new();
    collection.add_to_collection(
        ThreadId::new(format!("Worker{producer}")),
        [
            Event::timespan("Task", start, start + 50),
            Event::counter_delta("CompletedTasks", start + 50, 1.0),
        ]
        .into_iter()
        .collect(),
    );
    collection
}

#[test]
fn concurrent_hand_off() {
    let queue = Arc::new(CollectionQueue::new());
    let producers = (0..NUM_PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            thread::spawn(move || {
                for iteration in 0..COLLECTIONS_PER_PRODUCER {
                    queue.push(task(producer, iteration));
                }
            })
        })
        .collect::<Vec<_>>();

    // Consume collections while they are being produced
    let mut reporter = ReporterBase::new(queue.clone());
    let mut trees = TreeReporter::new();
    let expected = NUM_PRODUCERS * COLLECTIONS_PER_PRODUCER;
    let mut processed = 0;
    while processed < expected {
        processed += reporter.update(&mut trees);
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(reporter.update(&mut trees), 0);
    assert_eq!(reporter.processed_collections().len(), expected);
    assert!(queue.is_empty());

    let aggregate = trees.aggregate_tree();
    let task_key = Key::new("Task");
    assert_eq!(aggregate.event_time(task_key), Some(50 * expected as i64));
    assert_eq!(
        aggregate.counter_value(Key::new("CompletedTasks")),
        Some(expected as f64)
    );
    assert_eq!(aggregate.root().num_children(), NUM_PRODUCERS);
    for worker in aggregate.root().children() {
        let task = worker.child(task_key).unwrap();
        assert_eq!(task.count(), COLLECTIONS_PER_PRODUCER);
        assert_eq!(task.inclusive_time(), 50 * COLLECTIONS_PER_PRODUCER as i64);
    }

    let event_tree = trees.event_tree().unwrap();
    assert_eq!(event_tree.thread_nodes().count(), NUM_PRODUCERS);
    for worker in event_tree.thread_nodes() {
        assert_eq!(worker.num_children(), COLLECTIONS_PER_PRODUCER);
    }
}

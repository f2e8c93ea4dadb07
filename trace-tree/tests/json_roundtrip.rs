use more_asserts::assert_le;
use pretty_assertions::assert_eq;
use trace_tree::{
    json::{collection_from_json, write_collections},
    Collection, Event, EventTree, EventType, ThreadId,
};

/// Events of a small instrumented program, in the order where they would be
/// emitted (timespans are emitted once they are over)
fn captured() -> Collection {
    let mut collection = Collection::new();
    collection.add_to_collection(
        ThreadId::new("RoundTripMain"),
        [
            Event::begin("Outer", 1000),
            Event::scope_data("size", 1200, 4i64),
            Event::counter_delta("Allocations", 1500, 2.0),
            Event::timespan("Inner", 2000, 3000),
            Event::marker("Frame", 3500),
            Event::counter_value("Memory", 3600, 64.0),
            Event::end("Outer", 5000),
            Event::counter_delta("Allocations", 6000, -1.0),
        ]
        .into_iter()
        .collect(),
    );
    collection.add_to_collection(
        ThreadId::new("RoundTripWorker"),
        [
            Event::counter_delta("Allocations", 700, 1.0),
            Event::timespan("Job", 500, 800),
        ]
        .into_iter()
        .collect(),
    );
    collection
}

fn event_types(collection: &Collection, thread: &str) -> Vec<EventType> {
    collection
        .thread(&ThreadId::new(thread))
        .unwrap()
        .iter()
        .map(Event::event_type)
        .collect()
}

#[test]
fn with_vendor_block() {
    let captured = captured();
    let document = write_collections(&[&captured]);
    let imported = collection_from_json(&document).unwrap();
    assert_eq!(imported, captured);

    for (_thread, events) in imported.threads() {
        let times = events.iter().map(Event::completion_time).collect::<Vec<_>>();
        for pair in times.windows(2) {
            assert_le!(pair[0], pair[1]);
        }
    }

    // Rebuilding the tree from the imported data gives the same result
    assert_eq!(
        EventTree::new(&imported, None),
        EventTree::new(&captured, None)
    );
}

#[test]
fn chrome_events_only() {
    let tree = EventTree::new(&captured(), None);
    let imported = collection_from_json(&tree.to_chrome_trace()).unwrap();

    // Scope data comes back from the arguments of the enclosing scope
    assert_eq!(
        event_types(&imported, "RoundTripMain"),
        vec![
            EventType::Begin,
            EventType::ScopeData,
            EventType::Timespan,
            EventType::Marker,
            EventType::End,
        ]
    );
    assert_eq!(
        event_types(&imported, "RoundTripWorker"),
        vec![EventType::Timespan]
    );

    // Counter deltas cannot be told apart from absolute values anymore
    let counters = imported
        .thread(&ThreadId::new("0"))
        .unwrap()
        .iter()
        .map(|event| (event.key.as_str(), event.event_type(), event.counter()))
        .collect::<Vec<_>>();
    assert_eq!(
        counters,
        vec![
            ("Allocations", EventType::CounterValue, Some(1.0)),
            ("Allocations", EventType::CounterValue, Some(3.0)),
            ("Memory", EventType::CounterValue, Some(64.0)),
            ("Allocations", EventType::CounterValue, Some(2.0)),
        ]
    );

    // ...but the counter series are the same
    let reimported_tree = EventTree::new(&imported, None);
    assert_eq!(reimported_tree.counters(), tree.counters());
    assert_eq!(reimported_tree.markers().len(), 1);
}

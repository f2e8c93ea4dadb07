//! Per-thread event logs and the visitor protocol used to walk them

use crate::{
    category::CategoryId,
    event::Event,
    key::Key,
    thread::ThreadId,
};
use std::collections::{btree_map::Entry, BTreeMap};

/// Ordered, append-only sequence of events recorded by one thread
#[derive(Debug, Default, PartialEq)]
pub struct EventList {
    /// Events in recording order
    events: Vec<Event>,
}
//
impl EventList {
    /// Start an empty event list
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new event
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Move all events from another list to the end of this one
    pub fn append(&mut self, other: &mut EventList) {
        self.events.append(&mut other.events);
    }

    /// Events in recording order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> + Clone {
        self.events.iter()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Truth that no event was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
//
impl FromIterator<Event> for EventList {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}
//
impl Extend<Event> for EventList {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        self.events.extend(iter)
    }
}

/// Events captured from instrumentation, grouped by thread
///
/// Collections are move-only: once a collection has been handed over to a
/// consumer, the producer cannot keep appending to it.
#[derive(Debug, Default, PartialEq)]
pub struct Collection {
    /// Event list of each thread, ordered by thread id
    threads: BTreeMap<ThreadId, EventList>,
}
//
impl Collection {
    /// Start an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add events recorded by some thread
    ///
    /// If this thread already has events in the collection, the new events
    /// are appended after the existing ones.
    pub fn add_to_collection(&mut self, thread: ThreadId, mut events: EventList) {
        match self.threads.entry(thread) {
            Entry::Occupied(mut o) => o.get_mut().append(&mut events),
            Entry::Vacant(v) => {
                v.insert(events);
            }
        }
    }

    /// Threads and their events, in thread id order
    pub fn threads(&self) -> impl Iterator<Item = (&ThreadId, &EventList)> {
        self.threads.iter()
    }

    /// Events of a specific thread
    pub fn thread(&self, id: &ThreadId) -> Option<&EventList> {
        self.threads.get(id)
    }

    /// Truth that no thread recorded any event
    pub fn is_empty(&self) -> bool {
        self.threads.values().all(EventList::is_empty)
    }

    /// Walk the collection, visiting each thread's events in recording order
    pub fn iterate(&self, visitor: &mut impl CollectionVisitor) {
        self.walk(visitor, false)
    }

    /// Walk the collection, visiting each thread's events in reverse order
    pub fn reverse_iterate(&self, visitor: &mut impl CollectionVisitor) {
        self.walk(visitor, true)
    }

    /// Implementation of iterate() and reverse_iterate()
    fn walk(&self, visitor: &mut impl CollectionVisitor, reverse: bool) {
        visitor.on_begin_collection();
        for (thread, events) in &self.threads {
            visitor.on_begin_thread(thread);
            let mut visit = |event: &Event| {
                if visitor.accepts_category(event.category) {
                    visitor.on_event(thread, event.key, event);
                }
            };
            if reverse {
                events.iter().rev().for_each(&mut visit);
            } else {
                events.iter().for_each(&mut visit);
            }
            visitor.on_end_thread(thread);
        }
        visitor.on_end_collection();
    }
}

/// Consumer of the events of a Collection
///
/// Callbacks are invoked as follows: on_begin_collection(), then for each
/// thread in thread id order on_begin_thread(), on_event() for each event
/// whose category is accepted, and on_end_thread(), and finally
/// on_end_collection().
pub trait CollectionVisitor {
    /// Called before any other callback
    fn on_begin_collection(&mut self) {}

    /// Called after every other callback
    fn on_end_collection(&mut self) {}

    /// Called before the events of a thread are visited
    fn on_begin_thread(&mut self, _thread: &ThreadId) {}

    /// Called after the events of a thread were visited
    fn on_end_thread(&mut self, _thread: &ThreadId) {}

    /// Truth that events from this category should be visited
    fn accepts_category(&self, _category: CategoryId) -> bool {
        true
    }

    /// Called for each accepted event
    fn on_event(&mut self, thread: &ThreadId, key: Key, event: &Event);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build a collection from per-thread event lists
    pub fn collection(threads: Vec<(&str, Vec<Event>)>) -> Collection {
        let mut collection = Collection::new();
        for (thread, events) in threads {
            collection.add_to_collection(ThreadId::new(thread), events.into_iter().collect());
        }
        collection
    }

    /// Visitor which records the callbacks it receives
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        rejected: Option<CategoryId>,
    }
    //
    impl CollectionVisitor for Recorder {
        fn on_begin_collection(&mut self) {
            self.calls.push("begin collection".to_owned());
        }

        fn on_end_collection(&mut self) {
            self.calls.push("end collection".to_owned());
        }

        fn on_begin_thread(&mut self, thread: &ThreadId) {
            self.calls.push(format!("begin {thread}"));
        }

        fn on_end_thread(&mut self, thread: &ThreadId) {
            self.calls.push(format!("end {thread}"));
        }

        fn accepts_category(&self, category: CategoryId) -> bool {
            Some(category) != self.rejected
        }

        fn on_event(&mut self, thread: &ThreadId, key: Key, event: &Event) {
            self.calls
                .push(format!("{thread}: {key}@{}", event.timestamp()));
        }
    }

    fn sample() -> Collection {
        collection(vec![
            (
                "T2",
                vec![Event::begin("VisitA", 1), Event::end("VisitA", 2)],
            ),
            (
                "T1",
                vec![
                    Event::marker("VisitM", 3),
                    Event::marker("VisitHidden", 4).with_category(CategoryId(77)),
                ],
            ),
        ])
    }

    #[test]
    fn forward_iteration() {
        let mut recorder = Recorder::default();
        sample().iterate(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "begin collection",
                "begin T1",
                "T1: VisitM@3",
                "T1: VisitHidden@4",
                "end T1",
                "begin T2",
                "T2: VisitA@1",
                "T2: VisitA@2",
                "end T2",
                "end collection",
            ]
        );
    }

    #[test]
    fn reverse_iteration_with_filter() {
        let mut recorder = Recorder {
            rejected: Some(CategoryId(77)),
            ..Recorder::default()
        };
        sample().reverse_iterate(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "begin collection",
                "begin T1",
                "T1: VisitM@3",
                "end T1",
                "begin T2",
                "T2: VisitA@2",
                "T2: VisitA@1",
                "end T2",
                "end collection",
            ]
        );
    }

    #[test]
    fn appending_to_a_thread() {
        let mut collection = sample();
        collection.add_to_collection(
            ThreadId::new("T2"),
            vec![Event::marker("VisitLate", 9)].into_iter().collect(),
        );
        let events = collection.thread(&ThreadId::new("T2")).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().last().unwrap().timestamp(), 9);
        assert!(!collection.is_empty());
        assert!(Collection::new().is_empty());
    }
}

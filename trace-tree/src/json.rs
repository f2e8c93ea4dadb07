//! Conversion between Collections and Chrome Trace Event Format documents
//!
//! Scopes and markers are written as standard Chrome trace events. Counter
//! and scope data events are additionally written to a vendor-specific
//! `libTraceData` block, since the Chrome format cannot tell counter deltas
//! from absolute counter values.

use crate::{
    category::{register_category, CategoryId},
    collection::{Collection, EventList},
    ctf::{
        self, ChromeTrace, LibTraceData, RawChromeEvent, ThreadEvents, VendorEvent,
        LIB_TRACE_DATA, TRACE_EVENTS,
    },
    event::{
        microseconds_to_ticks, ticks_to_microseconds, DataValue, Event, EventData, EventType,
    },
    event_tree::EventTree,
    key::Key,
    thread::ThreadId,
};
use log::{debug, trace};
use serde::Deserialize;
use serde_json as json;
use std::collections::BTreeMap;

/// Write the events of some collections as a Chrome trace document
///
/// The collections are assembled into a single EventTree, in order, so that
/// counters carry over from one collection to the next.
pub fn write_collections(collections: &[&Collection]) -> json::Value {
    let mut remaining = collections.iter();
    let mut tree = match remaining.next() {
        Some(first) => EventTree::new(first, None),
        None => EventTree::new(&Collection::new(), None),
    };
    for collection in remaining {
        tree.add(collection);
    }

    let mut thread_events = BTreeMap::<&ThreadId, Vec<json::Value>>::new();
    for collection in collections {
        for (thread, events) in collection.threads() {
            let vendor_events = events
                .iter()
                .filter_map(vendor_event)
                .map(|event| ctf::to_json(&event))
                .collect::<Vec<_>>();
            if !vendor_events.is_empty() {
                thread_events
                    .entry(thread)
                    .or_default()
                    .extend(vendor_events);
            }
        }
    }
    let lib_trace_data = LibTraceData {
        threadEvents: thread_events
            .into_iter()
            .map(|(thread, events)| ThreadEvents {
                thread: thread.as_str().into(),
                events,
            })
            .collect(),
    };

    ctf::to_json(&ChromeTrace {
        traceEvents: tree.chrome_events(),
        libTraceData: Some(lib_trace_data),
    })
}

/// Vendor-specific record of events which Chrome traces cannot represent
fn vendor_event(event: &Event) -> Option<VendorEvent> {
    let value = match &event.data {
        EventData::CounterDelta { value, .. } | EventData::CounterValue { value, .. } => {
            json::Value::from(*value)
        }
        EventData::ScopeData { value, .. } => value.to_json(),
        _ => return None,
    };
    Some(VendorEvent {
        ty: event.event_type().as_str().into(),
        key: event.key.as_str().into(),
        category: event.category.0,
        ts: ticks_to_microseconds(event.timestamp()),
        end: None,
        value: Some(value),
    })
}

/// Read a Collection back from a Chrome trace document
///
/// Both the full document and a bare array of trace events are accepted.
/// Events that cannot be understood are skipped. Returns None if no event
/// could be extracted from the document.
pub fn collection_from_json(value: &json::Value) -> Option<Collection> {
    let (trace_events, vendor_data) = match value {
        json::Value::Array(events) => (events.as_slice(), None),
        json::Value::Object(map) => {
            let events = map
                .get(TRACE_EVENTS)
                .and_then(json::Value::as_array)
                .map_or(&[][..], Vec::as_slice);
            let vendor_data = map.get(LIB_TRACE_DATA).and_then(|data| {
                LibTraceData::deserialize(data)
                    .map_err(|e| trace!("Ignoring malformed {LIB_TRACE_DATA} block: {e}"))
                    .ok()
            });
            (events, vendor_data)
        }
        _ => return None,
    };

    // Counters and scope data come from the vendor block when available
    let mut threads = ThreadEventsMap::new();
    let has_vendor_data = vendor_data.is_some();
    for event in trace_events {
        match RawChromeEvent::deserialize(event) {
            Ok(event) => add_chrome_event(&mut threads, event, has_vendor_data),
            Err(e) => trace!("Skipping malformed trace event {event}: {e}"),
        }
    }
    for thread_events in vendor_data.into_iter().flat_map(|data| data.threadEvents) {
        let thread = ThreadId::new(thread_events.thread);
        for event in thread_events.events {
            match VendorEvent::deserialize(&event) {
                Ok(vendor) => {
                    if let Some(event) = event_from_vendor(vendor) {
                        threads.entry(thread.clone()).or_default().push(event);
                    }
                }
                Err(e) => trace!("Skipping malformed {LIB_TRACE_DATA} event {event}: {e}"),
            }
        }
    }

    if threads.is_empty() {
        debug!("No thread data found in JSON document");
        return None;
    }
    let mut collection = Collection::new();
    for (thread, mut events) in threads {
        events.sort_by_key(Event::completion_time);
        collection.add_to_collection(thread, events.into_iter().collect::<EventList>());
    }
    Some(collection)
}

/// Events of each thread, before sorting
type ThreadEventsMap = BTreeMap<ThreadId, Vec<Event>>;

/// Translate a Chrome trace event into events of a collection
fn add_chrome_event(threads: &mut ThreadEventsMap, event: RawChromeEvent, has_vendor_data: bool) {
    let (Some(ph), Some(name), Some(tid), Some(ts)) = (
        event.ph.as_deref(),
        event.name.as_deref(),
        event.tid.as_ref(),
        event.ts.as_ref().and_then(|ts| ts.as_f64()),
    ) else {
        trace!("Skipping incomplete trace event {event:?}");
        return;
    };
    let key = Key::new(name);
    let category = import_category(event.libTraceCatId, event.cat.as_deref());
    let time = microseconds_to_ticks(ts);
    let mut events = Vec::new();
    let mut push = |key, data| events.push(Event { key, category, data });

    match ph {
        "B" => push(key, EventData::Begin(time)),
        "E" => push(key, EventData::End(time)),
        "X" => match event.dur.as_ref().and_then(|dur| dur.as_f64()) {
            Some(dur) => push(
                key,
                EventData::Timespan {
                    start: time,
                    end: microseconds_to_ticks(ts + dur),
                },
            ),
            None => trace!("Skipping complete event {name} without a duration"),
        },
        "I" | "i" => push(key, EventData::Marker(time)),
        "C" if !has_vendor_data => {
            for (arg, value) in event.args.iter().flatten() {
                let Some(value) = value.as_f64() else {
                    continue;
                };
                let key = if &**arg == "value" {
                    key
                } else {
                    Key::new(&format!("{name} {arg}"))
                };
                push(key, EventData::CounterValue { time, value });
            }
        }
        "C" => {}
        other => trace!("Skipping trace event {name} of unsupported phase {other}"),
    }

    // Without the vendor block, scope data can only come from arguments
    if !has_vendor_data && matches!(ph, "B" | "X") && !events.is_empty() {
        for (arg, value) in event.args.iter().flatten() {
            let values = match value {
                json::Value::Array(values) => values.as_slice(),
                single => std::slice::from_ref(single),
            };
            for value in values.iter().filter_map(DataValue::from_json) {
                events.push(Event {
                    key: Key::new(arg),
                    category,
                    data: EventData::ScopeData { time, value },
                });
            }
        }
    }

    if !events.is_empty() {
        threads
            .entry(ThreadId::new(tid.to_text()))
            .or_default()
            .append(&mut events);
    }
}

/// Translate a vendor-specific record into an event
fn event_from_vendor(event: VendorEvent) -> Option<Event> {
    let time = microseconds_to_ticks(event.ts);
    let ty = event.ty.parse::<EventType>().unwrap_or(EventType::Unknown);
    let value = event.value.as_ref();
    let data = match ty {
        EventType::Begin => EventData::Begin(time),
        EventType::End => EventData::End(time),
        EventType::Marker => EventData::Marker(time),
        EventType::Timespan => EventData::Timespan {
            start: time,
            end: microseconds_to_ticks(event.end?),
        },
        EventType::CounterDelta => EventData::CounterDelta {
            time,
            value: value.and_then(json::Value::as_f64)?,
        },
        EventType::CounterValue => EventData::CounterValue {
            time,
            value: value.and_then(json::Value::as_f64)?,
        },
        EventType::ScopeData => EventData::ScopeData {
            time,
            value: value.and_then(DataValue::from_json)?,
        },
        other => {
            trace!("Ignoring {LIB_TRACE_DATA} event {} of type {other}", event.key);
            return None;
        }
    };
    Some(Event {
        key: Key::new(&event.key),
        category: CategoryId(event.category),
        data,
    })
}

/// Category of an imported event, registering its names
fn import_category(id: Option<u32>, names: Option<&str>) -> CategoryId {
    let mut names = names
        .into_iter()
        .flat_map(|names| names.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let id = match id {
        Some(id) => CategoryId(id),
        None => match names.next() {
            Some(first) => CategoryId::from_name(first),
            None => return CategoryId::DEFAULT,
        },
    };
    for name in names {
        register_category(id, name);
    }
    id
}

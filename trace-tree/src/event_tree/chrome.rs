//! Export of event trees in Chrome Trace Event Format

use super::{AttributeMap, EventNodeId, EventTree};
use crate::{
    category::{category_names, CategoryId},
    ctf::{self, ChromeEvent, ChromeTrace, Tid, PID},
    event::{ticks_to_microseconds, TimeStamp},
};
use serde_json as json;
use std::collections::BTreeMap;

/// Step of the depth-first walk through a thread's scopes
enum Step {
    /// Emit the opening event of a scope, then walk its children
    Enter(EventNodeId),

    /// Emit the closing event of a scope recorded as Begin/End events
    Exit(EventNodeId),
}

impl EventTree {
    /// Export as a Chrome Trace Event Format document
    ///
    /// Timespan scopes become complete ("X") events, Begin/End scopes become
    /// B/E event pairs enclosing the events of their nested scopes. Counter
    /// samples and markers follow the scope events.
    pub fn to_chrome_trace(&self) -> json::Value {
        ctf::to_json(&ChromeTrace {
            traceEvents: self.chrome_events(),
            libTraceData: None,
        })
    }

    /// Chrome Trace Event Format records describing this tree
    pub(crate) fn chrome_events(&self) -> Vec<ChromeEvent<'_>> {
        let mut events = Vec::new();

        // Thread roots are synthetic, only their descendants are emitted
        let mut stack = Vec::new();
        for thread in self.thread_nodes() {
            let tid = Tid::Thread(thread.key().as_str());
            let children = &self.node_data(thread.id()).children;
            stack.extend(children.iter().rev().map(|&id| Step::Enter(id)));
            while let Some(step) = stack.pop() {
                match step {
                    Step::Enter(id) => {
                        let node = self.node_data(id);
                        let mut event =
                            new_event(node.key.as_str(), node.category, tid.clone(), node.begin);
                        event.args = args(&node.attributes);
                        if node.from_separate_events {
                            event.ph = "B";
                            stack.push(Step::Exit(id));
                        } else {
                            event.ph = "X";
                            event.dur = Some(ticks_to_microseconds(
                                node.end.saturating_sub(node.begin),
                            ));
                        }
                        events.push(event);
                        stack.extend(node.children.iter().rev().map(|&child| Step::Enter(child)));
                    }
                    Step::Exit(id) => {
                        let node = self.node_data(id);
                        let mut event =
                            new_event(node.key.as_str(), node.category, tid.clone(), node.end);
                        event.ph = "E";
                        events.push(event);
                    }
                }
            }
        }

        for (key, series) in self.counters() {
            for &(time, value) in series {
                let mut event =
                    new_event(key.as_str(), CategoryId::DEFAULT, Tid::Global(0), time);
                event.ph = "C";
                event.args = Some(BTreeMap::from([("value", json::Value::from(value))]));
                events.push(event);
            }
        }

        for (key, series) in self.markers() {
            for (time, thread) in series {
                let mut event = new_event(
                    key.as_str(),
                    CategoryId::DEFAULT,
                    Tid::Thread(thread.as_str()),
                    *time,
                );
                event.ph = "I";
                event.s = Some("t");
                events.push(event);
            }
        }

        events
    }
}

/// Set up an event record, leaving the phase-specific fields blank
fn new_event<'a>(
    name: &'a str,
    category: CategoryId,
    tid: Tid<'a>,
    time: TimeStamp,
) -> ChromeEvent<'a> {
    ChromeEvent {
        cat: category_names(category).join(","),
        libTraceCatId: category.0,
        pid: PID,
        tid,
        name,
        ts: ticks_to_microseconds(time),
        ph: "",
        dur: None,
        s: None,
        args: None,
    }
}

/// Translate scope attributes into event arguments
///
/// Keys with a single value map to that value, keys with several values map
/// to an array of them.
fn args(attributes: &AttributeMap) -> Option<BTreeMap<&'static str, json::Value>> {
    if attributes.is_empty() {
        return None;
    }
    let args = attributes
        .iter()
        .map(|(key, values)| {
            let value = match values.as_slice() {
                [single] => single.to_json(),
                multiple => json::Value::Array(multiple.iter().map(|v| v.to_json()).collect()),
            };
            (key.as_str(), value)
        })
        .collect();
    Some(args)
}

#[cfg(test)]
mod tests {
    use crate::{collection::tests::collection, event::Event, event_tree::EventTree};
    use pretty_assertions::assert_eq;
    use serde_json as json;

    #[test]
    fn event_kinds() {
        let tree = EventTree::new(
            &collection(vec![(
                "Main",
                vec![
                    Event::begin("ChromeOuter", 1000),
                    Event::scope_data("flag", 1500, 3i64),
                    Event::counter_value("ChromeCounter", 2500, 1.5),
                    Event::timespan("ChromeInner", 2000, 3000),
                    Event::marker("ChromeMarker", 3500),
                    Event::end("ChromeOuter", 4000),
                ],
            )]),
            None,
        );
        assert_eq!(
            tree.to_chrome_trace(),
            json::json!({
                "traceEvents": [
                    {
                        "cat": "Default", "libTraceCatId": 0, "pid": 0, "tid": "Main",
                        "name": "ChromeOuter", "ts": 1.0, "ph": "B",
                        "args": { "flag": 3 }
                    },
                    {
                        "cat": "Default", "libTraceCatId": 0, "pid": 0, "tid": "Main",
                        "name": "ChromeInner", "ts": 2.0, "ph": "X", "dur": 1.0
                    },
                    {
                        "cat": "Default", "libTraceCatId": 0, "pid": 0, "tid": "Main",
                        "name": "ChromeOuter", "ts": 4.0, "ph": "E"
                    },
                    {
                        "cat": "Default", "libTraceCatId": 0, "pid": 0, "tid": 0,
                        "name": "ChromeCounter", "ts": 2.5, "ph": "C",
                        "args": { "value": 1.5 }
                    },
                    {
                        "cat": "Default", "libTraceCatId": 0, "pid": 0, "tid": "Main",
                        "name": "ChromeMarker", "ts": 3.5, "ph": "I", "s": "t"
                    },
                ]
            })
        );
    }

    #[test]
    fn nested_pairs_and_repeated_data() {
        let tree = EventTree::new(
            &collection(vec![
                (
                    "T1",
                    vec![
                        Event::begin("NestOuter", 0),
                        Event::begin("NestInner", 10),
                        Event::scope_data("item", 11, "a"),
                        Event::scope_data("item", 12, "b"),
                        Event::end("NestInner", 20),
                        Event::end("NestOuter", 30),
                    ],
                ),
                ("T2", vec![Event::timespan("NestOther", 5, 6)]),
            ]),
            None,
        );
        let trace = tree.to_chrome_trace();
        let events = trace["traceEvents"].as_array().unwrap();
        let summary = events
            .iter()
            .map(|e| {
                (
                    e["tid"].as_str().unwrap(),
                    e["name"].as_str().unwrap(),
                    e["ph"].as_str().unwrap(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("T1", "NestOuter", "B"),
                ("T1", "NestInner", "B"),
                ("T1", "NestInner", "E"),
                ("T1", "NestOuter", "E"),
                ("T2", "NestOther", "X"),
            ]
        );
        assert_eq!(events[1]["args"], json::json!({ "item": ["a", "b"] }));
        assert_eq!(events[2].get("args"), None);
    }
}

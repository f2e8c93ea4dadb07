//! Conversion of counter events into absolute time series

use crate::{
    category::CategoryId,
    collection::{Collection, CollectionVisitor},
    event::{Event, EventData, TimeStamp},
    key::Key,
    thread::ThreadId,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

/// Time series of a counter's absolute value, in timestamp order
pub type CounterSeries = Vec<(TimeStamp, f64)>;

/// Time series of every counter
pub type CounterValuesMap = BTreeMap<Key, CounterSeries>;

/// Current value of every counter
pub type CounterMap = HashMap<Key, f64>;

/// Category filter shared by the builders
pub(crate) type CategoryFilter = Arc<dyn Fn(CategoryId) -> bool + Send + Sync>;

/// Counter event buffered until the end of a collection
#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingSample {
    /// When the event happened
    time: TimeStamp,

    /// Value carried by the event
    value: f64,

    /// Truth that the value is relative to the previous one
    is_delta: bool,
}

/// Turns counter deltas and values into absolute time series
///
/// The value of every counter is carried from one update() to the next, so
/// that successive collections of a profiling session produce a continuous
/// series.
#[derive(Default)]
pub struct CounterAccumulator {
    /// Absolute time series accumulated so far
    counters: CounterValuesMap,

    /// Value of each counter at the end of the last update
    current_values: CounterMap,

    /// Counter events of the collection being processed
    pending: HashMap<Key, Vec<PendingSample>>,

    /// Counters of the collection being processed, by order of appearance
    pending_order: Vec<Key>,

    /// Optional restriction on the categories of accepted counter events
    filter: Option<CategoryFilter>,
}
//
impl CounterAccumulator {
    /// Set up an accumulator where all counters start at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accumulate counter events from categories accepted by `filter`
    pub fn with_category_filter(
        mut self,
        filter: impl Fn(CategoryId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Share a filter with the enclosing builder
    pub(crate) fn set_category_filter(&mut self, filter: Option<CategoryFilter>) {
        self.filter = filter;
    }

    /// Process the counter events of a collection
    pub fn update(&mut self, collection: &Collection) {
        collection.iterate(self);
    }

    /// Set the values that counters start from at the next update
    pub fn set_current_values(&mut self, values: CounterMap) {
        self.current_values = values;
    }

    /// Value of each counter at the end of the last update
    pub fn current_values(&self) -> &CounterMap {
        &self.current_values
    }

    /// Absolute time series accumulated so far
    pub fn counters(&self) -> &CounterValuesMap {
        &self.counters
    }

    /// Extract the accumulated time series
    pub fn into_counters(self) -> CounterValuesMap {
        self.counters
    }
}
//
impl CollectionVisitor for CounterAccumulator {
    fn on_end_collection(&mut self) {
        for key in self.pending_order.drain(..) {
            let Some(mut samples) = self.pending.remove(&key) else {
                continue;
            };
            // Stable sort keeps same-timestamp samples in arrival order
            samples.sort_by_key(|sample| sample.time);

            let mut value = self.current_values.get(&key).copied().unwrap_or(0.0);
            let series = self.counters.entry(key).or_default();
            series.reserve(samples.len());
            for sample in samples {
                if sample.is_delta {
                    value += sample.value;
                } else {
                    value = sample.value;
                }
                series.push((sample.time, value));
            }
            self.current_values.insert(key, value);
        }
        self.pending.clear();
    }

    fn accepts_category(&self, category: CategoryId) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(category))
    }

    fn on_event(&mut self, _thread: &ThreadId, key: Key, event: &Event) {
        let (time, value, is_delta) = match event.data {
            EventData::CounterDelta { time, value } => (time, value, true),
            EventData::CounterValue { time, value } => (time, value, false),
            _ => return,
        };
        let samples = self.pending.entry(key).or_insert_with(|| {
            self.pending_order.push(key);
            Vec::new()
        });
        samples.push(PendingSample {
            time,
            value,
            is_delta,
        });
    }
}

//! Individual trace events

use crate::{category::CategoryId, key::Key};
use serde_json as json;
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Timestamp, as a number of clock ticks
pub type TimeStamp = i64;

/// Number of clock ticks per nanosecond
///
/// Instrumentation timestamps are recorded using a nanosecond clock.
pub const TICKS_PER_NANOSECOND: f64 = 1.0;

/// Convert a tick count to nanoseconds
pub fn ticks_to_nanoseconds(ticks: TimeStamp) -> f64 {
    ticks as f64 / TICKS_PER_NANOSECOND
}

/// Convert a tick count to (fractional) microseconds
pub fn ticks_to_microseconds(ticks: TimeStamp) -> f64 {
    ticks_to_nanoseconds(ticks) / 1000.0
}

/// Convert (fractional) microseconds to the nearest tick count
pub fn microseconds_to_ticks(us: f64) -> TimeStamp {
    (us * 1000.0 * TICKS_PER_NANOSECOND).round() as TimeStamp
}

/// Value attached to a scope by a ScopeData event
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    /// Boolean flag
    Bool(bool),

    /// Signed integer
    Int(i64),

    /// Unsigned integer
    UInt(u64),

    /// Floating-point number
    Float(f64),

    /// Character string
    String(Box<str>),
}
//
impl DataValue {
    /// Convert to JSON
    pub fn to_json(&self) -> json::Value {
        match self {
            Self::Bool(b) => json::Value::from(*b),
            Self::Int(i) => json::Value::from(*i),
            Self::UInt(u) => json::Value::from(*u),
            Self::Float(f) => json::Value::from(*f),
            Self::String(s) => json::Value::from(&**s),
        }
    }

    /// Convert from JSON, if the value is a scalar
    pub fn from_json(value: &json::Value) -> Option<Self> {
        match value {
            json::Value::Bool(b) => Some(Self::Bool(*b)),
            json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Self::UInt(u))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            json::Value::String(s) => Some(Self::String(s.as_str().into())),
            _ => None,
        }
    }
}
//
impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
//
impl From<i64> for DataValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}
//
impl From<u64> for DataValue {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}
//
impl From<f64> for DataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}
//
impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

/// Payload of an event
#[derive(Clone, Debug, PartialEq)]
pub enum EventData {
    /// Start of a scope
    Begin(TimeStamp),

    /// End of a scope
    End(TimeStamp),

    /// Complete scope, reported at once
    Timespan {
        /// Start of the scope
        start: TimeStamp,

        /// End of the scope
        end: TimeStamp,
    },

    /// Change of a counter's value
    CounterDelta {
        /// When the change happened
        time: TimeStamp,

        /// Amount by which the counter changed
        value: f64,
    },

    /// New absolute value of a counter
    CounterValue {
        /// When the counter took this value
        time: TimeStamp,

        /// New value of the counter
        value: f64,
    },

    /// Point in time of interest
    Marker(TimeStamp),

    /// Data attached to the enclosing scope
    ScopeData {
        /// When the data was recorded
        time: TimeStamp,

        /// Recorded data
        value: DataValue,
    },

    /// Event of a kind that this library does not know about
    Unknown(TimeStamp),
}

/// Kind of event, as named in the vendor-specific JSON schema
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventType {
    /// See EventData::Begin
    Begin,
    /// See EventData::End
    End,
    /// See EventData::Timespan
    Timespan,
    /// See EventData::CounterDelta
    CounterDelta,
    /// See EventData::CounterValue
    CounterValue,
    /// See EventData::Marker
    Marker,
    /// See EventData::ScopeData
    ScopeData,
    /// See EventData::Unknown
    Unknown,
}
//
impl EventType {
    /// Name of this event type in JSON
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "Begin",
            Self::End => "End",
            Self::Timespan => "Timespan",
            Self::CounterDelta => "CounterDelta",
            Self::CounterValue => "CounterValue",
            Self::Marker => "Marker",
            Self::ScopeData => "Data",
            Self::Unknown => "Unknown",
        }
    }
}
//
impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Begin" => Self::Begin,
            "End" => Self::End,
            "Timespan" => Self::Timespan,
            "CounterDelta" => Self::CounterDelta,
            "CounterValue" => Self::CounterValue,
            "Marker" => Self::Marker,
            "Data" => Self::ScopeData,
            _ => Self::Unknown,
        })
    }
}
//
impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamped occurence recorded by instrumentation
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Name of the scope, counter, marker or datum
    pub key: Key,

    /// Category, for filtering
    pub category: CategoryId,

    /// Type-dependent payload
    pub data: EventData,
}
//
impl Event {
    /// Start of a scope
    pub fn begin(key: impl Into<Key>, time: TimeStamp) -> Self {
        Self::new(key, EventData::Begin(time))
    }

    /// End of a scope
    pub fn end(key: impl Into<Key>, time: TimeStamp) -> Self {
        Self::new(key, EventData::End(time))
    }

    /// Complete scope
    pub fn timespan(key: impl Into<Key>, start: TimeStamp, end: TimeStamp) -> Self {
        Self::new(key, EventData::Timespan { start, end })
    }

    /// Relative counter change
    pub fn counter_delta(key: impl Into<Key>, time: TimeStamp, value: f64) -> Self {
        Self::new(key, EventData::CounterDelta { time, value })
    }

    /// Absolute counter value
    pub fn counter_value(key: impl Into<Key>, time: TimeStamp, value: f64) -> Self {
        Self::new(key, EventData::CounterValue { time, value })
    }

    /// Marker
    pub fn marker(key: impl Into<Key>, time: TimeStamp) -> Self {
        Self::new(key, EventData::Marker(time))
    }

    /// Scope data
    pub fn scope_data(key: impl Into<Key>, time: TimeStamp, value: impl Into<DataValue>) -> Self {
        Self::new(
            key,
            EventData::ScopeData {
                time,
                value: value.into(),
            },
        )
    }

    /// Same event, in another category
    pub fn with_category(self, category: CategoryId) -> Self {
        Self { category, ..self }
    }

    /// Event in the default category
    fn new(key: impl Into<Key>, data: EventData) -> Self {
        Self {
            key: key.into(),
            category: CategoryId::DEFAULT,
            data,
        }
    }

    /// Kind of event
    pub fn event_type(&self) -> EventType {
        match self.data {
            EventData::Begin(_) => EventType::Begin,
            EventData::End(_) => EventType::End,
            EventData::Timespan { .. } => EventType::Timespan,
            EventData::CounterDelta { .. } => EventType::CounterDelta,
            EventData::CounterValue { .. } => EventType::CounterValue,
            EventData::Marker(_) => EventType::Marker,
            EventData::ScopeData { .. } => EventType::ScopeData,
            EventData::Unknown(_) => EventType::Unknown,
        }
    }

    /// When the event happened (start time for timespans)
    pub fn timestamp(&self) -> TimeStamp {
        match self.data {
            EventData::Begin(t)
            | EventData::End(t)
            | EventData::Marker(t)
            | EventData::Unknown(t)
            | EventData::Timespan { start: t, .. }
            | EventData::CounterDelta { time: t, .. }
            | EventData::CounterValue { time: t, .. }
            | EventData::ScopeData { time: t, .. } => t,
        }
    }

    /// End time of a timespan
    pub fn end_timestamp(&self) -> Option<TimeStamp> {
        match self.data {
            EventData::Timespan { end, .. } => Some(end),
            _ => None,
        }
    }

    /// When the event was complete (end time for timespans)
    ///
    /// Instrumentation records timespans once they are over, so this is the
    /// order in which a thread emits its events.
    pub fn completion_time(&self) -> TimeStamp {
        self.end_timestamp().unwrap_or_else(|| self.timestamp())
    }

    /// Value of a counter event
    pub fn counter(&self) -> Option<f64> {
        match self.data {
            EventData::CounterDelta { value, .. } | EventData::CounterValue { value, .. } => {
                Some(value)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn tick_conversions() {
        assert_eq!(ticks_to_microseconds(1500), 1.5);
        assert_eq!(microseconds_to_ticks(1.5), 1500);
        assert_eq!(microseconds_to_ticks(0.0004), 0);
    }

    #[test]
    fn accessors() {
        let span = Event::timespan("AccessorSpan", 10, 20);
        assert_eq!(span.event_type(), EventType::Timespan);
        assert_eq!(span.timestamp(), 10);
        assert_eq!(span.end_timestamp(), Some(20));
        assert_eq!(span.counter(), None);

        let delta = Event::counter_delta("AccessorCounter", 5, 2.5);
        assert_eq!(delta.timestamp(), 5);
        assert_eq!(delta.end_timestamp(), None);
        assert_eq!(delta.counter(), Some(2.5));
        assert_eq!(delta.category, CategoryId::DEFAULT);
    }

    #[test]
    fn event_type_names() {
        for ty in [
            EventType::Begin,
            EventType::End,
            EventType::Timespan,
            EventType::CounterDelta,
            EventType::CounterValue,
            EventType::Marker,
            EventType::ScopeData,
            EventType::Unknown,
        ] {
            assert_eq!(ty.as_str().parse::<EventType>(), Ok(ty));
        }
        assert_eq!(EventType::ScopeData.to_string(), "Data");
        assert_eq!("Whatever".parse::<EventType>(), Ok(EventType::Unknown));
    }

    #[test]
    fn data_values_from_json() {
        assert_eq!(
            DataValue::from_json(&json::json!(true)),
            Some(DataValue::Bool(true))
        );
        assert_eq!(
            DataValue::from_json(&json::json!(-3)),
            Some(DataValue::Int(-3))
        );
        assert_eq!(
            DataValue::from_json(&json::json!(u64::MAX)),
            Some(DataValue::UInt(u64::MAX))
        );
        assert_eq!(
            DataValue::from_json(&json::json!(0.5)),
            Some(DataValue::Float(0.5))
        );
        assert_matches!(
            DataValue::from_json(&json::json!("text")),
            Some(DataValue::String(s)) => assert_eq!(&*s, "text")
        );
        assert_eq!(DataValue::from_json(&json::json!([1])), None);
    }
}

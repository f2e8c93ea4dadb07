//! Chrome Trace Event Format records, plus the vendor-specific side channel
//! used to preserve events which that format cannot represent
//!
//! Based on the documentation available at
//! <https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU>
//!
//! Only the subset of the format which is produced by EventTree is modeled.
//! Deserialization is deliberately lenient, since traces are often produced
//! or edited by other tools.

use log::error;
use serde::{Deserialize, Serialize};
use serde_json as json;
use std::collections::BTreeMap;

/// Top-level key of the event array
pub const TRACE_EVENTS: &str = "traceEvents";

/// Top-level key of the vendor-specific side channel
pub const LIB_TRACE_DATA: &str = "libTraceData";

/// Dummy process id written in every event
pub const PID: u32 = 0;

/// Trace document, as written
#[derive(Clone, Debug, PartialEq, Serialize)]
#[allow(non_snake_case)]
pub struct ChromeTrace<'a> {
    /// Events in Chrome Trace Event Format
    pub traceEvents: Vec<ChromeEvent<'a>>,

    /// Events which the Chrome format cannot represent faithfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libTraceData: Option<LibTraceData>,
}

/// Convert a record to a JSON value
///
/// Records only contain strings, numbers and string-keyed maps, so this
/// cannot fail in practice.
pub(crate) fn to_json(record: &impl Serialize) -> json::Value {
    json::to_value(record).unwrap_or_else(|e| {
        error!("Failed to convert a trace record to JSON: {e}");
        json::Value::Null
    })
}

/// Event record, as written
#[derive(Clone, Debug, PartialEq, Serialize)]
#[allow(non_snake_case)]
pub struct ChromeEvent<'a> {
    /// Comma-separated category names
    pub cat: String,

    /// Raw category id
    pub libTraceCatId: u32,

    /// Process ID, always PID
    pub pid: u32,

    /// Thread ID
    pub tid: Tid<'a>,

    /// Name of the event
    pub name: &'a str,

    /// Timestamp in microseconds
    pub ts: f64,

    /// Phase (event type)
    pub ph: &'static str,

    /// Duration of complete events in microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,

    /// Scope of instant events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<&'static str>,

    /// Extra arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<&'a str, json::Value>>,
}

/// Thread ID of a written event
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Tid<'a> {
    /// Events that are not associated with a thread, like counters
    Global(u32),

    /// Events recorded by a thread
    Thread(&'a str),
}

/// Event record, as read
///
/// Every field is optional so that records which lack something can be
/// skipped individually instead of failing the whole import.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[allow(non_snake_case)]
pub struct RawChromeEvent {
    /// Phase (event type)
    pub ph: Option<Box<str>>,

    /// Name of the event
    pub name: Option<Box<str>>,

    /// Comma-separated category names
    pub cat: Option<Box<str>>,

    /// Raw category id
    pub libTraceCatId: Option<u32>,

    /// Thread ID
    pub tid: Option<RawScalar>,

    /// Timestamp in microseconds
    pub ts: Option<RawScalar>,

    /// Duration of complete events in microseconds
    pub dur: Option<RawScalar>,

    /// Extra arguments
    pub args: Option<BTreeMap<Box<str>, json::Value>>,
}

/// Number which some producers encode as a string
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawScalar {
    /// Genuine JSON number
    Number(json::Number),

    /// Number encoded as a string
    Str(Box<str>),
}
//
impl RawScalar {
    /// Interpret as a floating-point number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Textual form, used for thread IDs
    pub fn to_text(&self) -> Box<str> {
        match self {
            Self::Number(n) => n.to_string().into_boxed_str(),
            Self::Str(s) => s.clone(),
        }
    }
}

/// Vendor-specific side channel
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[allow(non_snake_case)]
pub struct LibTraceData {
    /// Events of each thread
    #[serde(default)]
    pub threadEvents: Vec<ThreadEvents>,
}

/// Events of one thread in the vendor-specific side channel
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ThreadEvents {
    /// Thread ID
    pub thread: Box<str>,

    /// Events of the thread, kept as raw JSON so that bad records can be
    /// skipped individually
    #[serde(default)]
    pub events: Vec<json::Value>,
}

/// Event record of the vendor-specific side channel
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VendorEvent {
    /// Event type, see EventType::as_str()
    #[serde(rename = "type")]
    pub ty: Box<str>,

    /// Name of the event
    pub key: Box<str>,

    /// Raw category id
    #[serde(default)]
    pub category: u32,

    /// Timestamp in microseconds
    pub ts: f64,

    /// End of timespans in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,

    /// Counter value or datum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<json::Value>,
}

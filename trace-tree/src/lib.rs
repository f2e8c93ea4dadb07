//! Reconstruction of call trees and counter time series from the flat,
//! per-thread event streams recorded by instrumented programs, along with
//! their aggregation and Chrome Trace Event Format import/export.

#![deny(missing_docs)]

pub mod aggregate_tree;
pub mod category;
pub mod collection;
pub mod counter;
mod ctf;
pub mod event;
pub mod event_tree;
pub mod json;
pub mod key;
pub mod reporter;
pub mod serialization;
pub mod thread;

// Reexport the most commonly used types at the crate root
pub use self::{
    aggregate_tree::{
        AggregateNodeId, AggregateNodeIndex, AggregateNodeRef, AggregateTree,
        AggregateTreeBuilder, CounterRegistrationError,
    },
    category::CategoryId,
    collection::{Collection, CollectionVisitor, EventList},
    counter::{CounterAccumulator, CounterMap, CounterValuesMap},
    event::{DataValue, Event, EventData, EventType, TimeStamp},
    event_tree::{EventNodeId, EventNodeRef, EventTree, EventTreeBuilder},
    key::Key,
    reporter::{CollectionProcessor, CollectionQueue, DataSource, ReporterBase, TreeReporter},
    serialization::SerializationError,
    thread::ThreadId,
};

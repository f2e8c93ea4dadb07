//! Persistence of collections as JSON byte streams

use crate::{
    collection::Collection,
    json::{collection_from_json, write_collections},
};
use log::debug;
use serde_json as json;
use std::io::{self, BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Write some collections to a byte stream, as a Chrome trace document
pub fn write(writer: impl Write, collections: &[&Collection]) -> Result<(), SerializationError> {
    let document = write_collections(collections);
    let mut writer = BufWriter::new(writer);
    json::to_writer(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

/// Read a collection back from a byte stream
pub fn read(reader: impl Read) -> Result<Collection, SerializationError> {
    let document = json::from_reader::<_, json::Value>(BufReader::new(reader))?;
    let collection = collection_from_json(&document).ok_or(SerializationError::NoThreadData)?;
    debug!(
        "Read collection with {} threads",
        collection.threads().count()
    );
    Ok(collection)
}

/// What can go wrong while reading or writing collections
#[derive(Error, Debug)]
pub enum SerializationError {
    /// Failed to access the underlying byte stream
    #[error("failed to access trace data ({0})")]
    Io(#[from] io::Error),

    /// Input is not valid JSON
    #[error("line: {line}, col: {column} -> {reason}")]
    Parse {
        /// Line where the error was detected, starting at 1
        line: usize,

        /// Column where the error was detected, starting at 1
        column: usize,

        /// What went wrong
        reason: String,
    },

    /// Input is valid JSON, but contains no trace event
    #[error("no thread data found in trace")]
    NoThreadData,
}
//
impl From<json::Error> for SerializationError {
    fn from(e: json::Error) -> Self {
        if e.is_io() {
            return Self::Io(e.into());
        }
        let line = e.line();
        let column = e.column();
        let message = e.to_string();
        let reason = match message.rsplit_once(" at line ") {
            Some((reason, _position)) => reason.to_owned(),
            None => message,
        };
        Self::Parse {
            line,
            column,
            reason,
        }
    }
}

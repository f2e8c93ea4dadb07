//! Thread identifiers

use std::fmt::{self, Display, Formatter};

/// Opaque identifier of the thread which emitted some events
///
/// How identifiers are allocated is up to the instrumentation that produced
/// the events. This type only requires them to be comparable and printable.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadId(Box<str>);
//
impl ThreadId {
    /// Wrap a thread identifier
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Textual form of the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
//
impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
//
impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
//
impl Display for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

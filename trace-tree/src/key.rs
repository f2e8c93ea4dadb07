//! Interned event keys

use lasso::{Spur, ThreadedRodeo};
use once_cell::sync::Lazy;
use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
};

/// Process-wide interner backing every Key
static INTERNER: Lazy<ThreadedRodeo> = Lazy::new(ThreadedRodeo::new);

/// Interned name of an event, counter or marker
///
/// Keys are cheap to copy and compare. Two keys are equal if and only if they
/// were built from the same string, which makes them usable as map keys in
/// place of the string itself.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Key(Spur);
//
impl Key {
    /// Intern a string
    pub fn new(name: &str) -> Self {
        Self(INTERNER.get_or_intern(name))
    }

    /// String which this key was built from
    pub fn as_str(&self) -> &'static str {
        // The interner is never dropped, so its strings live forever
        let interner: &'static ThreadedRodeo = &INTERNER;
        interner.resolve(&self.0)
    }
}
//
impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
//
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            Ordering::Equal
        } else {
            self.as_str().cmp(other.as_str())
        }
    }
}
//
impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
//
impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.as_str())
    }
}
//
impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Event categories and the process-wide category name registry

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::RwLock,
};

/// Small integer identifying a filterable category of events
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CategoryId(pub u32);
//
impl CategoryId {
    /// Category of events which were not given one explicitly
    pub const DEFAULT: Self = Self(0);

    /// Category associated with a name, registering it on first use
    ///
    /// The id is a hash of the name, so it does not depend on the order in
    /// which names are first seen. If that id is already taken by another
    /// name, the next free id is used instead.
    pub fn from_name(name: &str) -> Self {
        let mut registry = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = registry.ids_by_name.get(name) {
            return id;
        }
        let mut id = name_hash(name);
        while id == Self::DEFAULT.0 || registry.names.contains_key(&Self(id)) {
            id = id.wrapping_add(1);
        }
        let id = Self(id);
        registry.register(id, name);
        id
    }
}
//
impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Associate a human-readable name with a category
///
/// A category may be given several names, which are reported in registration
/// order. Registering the same name twice is a no-op.
pub fn register_category(id: CategoryId, name: &str) {
    let mut registry = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    registry.register(id, name);
}

/// Names that were registered for a category
pub fn category_names(id: CategoryId) -> Vec<&'static str> {
    let registry = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    registry.names.get(&id).cloned().unwrap_or_default()
}

/// 32-bit FNV-1a hash of a category name
fn name_hash(name: &str) -> u32 {
    name.bytes().fold(0x811c_9dc5, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Global category registry
static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(CategoryId::DEFAULT, "Default");
    RwLock::new(registry)
});

/// Contents of the category registry
#[derive(Debug, Default)]
struct Registry {
    /// Names of each category
    names: HashMap<CategoryId, Vec<&'static str>>,

    /// Reverse mapping used by CategoryId::from_name
    ids_by_name: HashMap<&'static str, CategoryId>,
}
//
impl Registry {
    /// Record a category name
    fn register(&mut self, id: CategoryId, name: &str) {
        let names = self.names.entry(id).or_default();
        if names.iter().any(|&known| known == name) {
            return;
        }
        // Registered names are few and live as long as the process
        let name: &'static str = Box::leak(name.into());
        names.push(name);
        self.ids_by_name.entry(name).or_insert(id);
    }
}

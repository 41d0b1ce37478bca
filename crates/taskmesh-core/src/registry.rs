//! Per-process registry of components.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::component::Component;
use crate::error::{ComponentError, ComponentResult};

/// Components of one process, keyed by name.
///
/// A single lock guards the map so that add, remove and lookup never
/// observe a half-updated set.
pub struct ComponentRegistry {
    components: Mutex<BTreeMap<String, Arc<Component>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a component. Fails if the name is taken.
    pub fn register(&self, component: Arc<Component>) -> ComponentResult<()> {
        let mut components = self.components.lock();
        let name = component.name().to_string();
        if components.contains_key(&name) {
            return Err(ComponentError::AlreadyRegistered(name));
        }
        components.insert(name, component);
        Ok(())
    }

    /// Remove a component and hand it back.
    pub fn unregister(&self, name: &str) -> ComponentResult<Arc<Component>> {
        self.components
            .lock()
            .remove(name)
            .ok_or_else(|| ComponentError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Component>> {
        self.components.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.lock().contains_key(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.components.lock().keys().cloned().collect()
    }

    /// All components in name order, cloned out of the lock.
    pub fn snapshot(&self) -> Vec<Arc<Component>> {
        self.components.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.components.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.lock().is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

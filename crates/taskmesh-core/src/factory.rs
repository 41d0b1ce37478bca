//! Construction of components by class name.
//!
//! Classes are constructors registered under a name. Libraries are named
//! bundles of classes that become available once loaded.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::component::{Component, ComponentBuilder};
use crate::error::{ComponentError, ComponentResult};

/// Builds a component from a builder preset with its name and class, and
/// the constructor arguments.
pub type Constructor =
    Arc<dyn Fn(ComponentBuilder, &Value) -> ComponentResult<Arc<Component>> + Send + Sync>;

/// A named bundle of classes.
#[derive(Clone)]
pub struct ClassLibrary {
    name: String,
    classes: Vec<(String, Constructor)>,
}

impl ClassLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    pub fn with_class<F>(mut self, class: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(ComponentBuilder, &Value) -> ComponentResult<Arc<Component>> + Send + Sync + 'static,
    {
        self.classes.push((class.into(), Arc::new(constructor)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Registry of component classes and loadable libraries.
pub struct ComponentFactory {
    classes: DashMap<String, Constructor>,
    libraries: DashMap<String, ClassLibrary>,
    loaded: DashMap<String, ()>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            libraries: DashMap::new(),
            loaded: DashMap::new(),
        }
    }

    /// Make a class available immediately.
    pub fn register_class<F>(&self, class: &str, constructor: F) -> ComponentResult<()>
    where
        F: Fn(ComponentBuilder, &Value) -> ComponentResult<Arc<Component>> + Send + Sync + 'static,
    {
        self.insert_class(class, Arc::new(constructor))
    }

    fn insert_class(&self, class: &str, constructor: Constructor) -> ComponentResult<()> {
        if self.classes.contains_key(class) {
            return Err(ComponentError::AlreadyRegistered(class.to_string()));
        }
        self.classes.insert(class.to_string(), constructor);
        Ok(())
    }

    /// Make a library known without loading its classes.
    pub fn register_library(&self, library: ClassLibrary) {
        debug!("Registered library {}", library.name());
        self.libraries.insert(library.name().to_string(), library);
    }

    /// Load a library, registering its classes. Loading twice is a no-op.
    ///
    /// Returns the classes the library provides.
    pub fn load_library(&self, name: &str) -> ComponentResult<Vec<String>> {
        let library = self
            .libraries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ComponentError::LibraryNotFound(name.to_string()))?;
        if self.loaded.insert(name.to_string(), ()).is_some() {
            debug!("Library {} already loaded", name);
            return Ok(library.class_names());
        }
        for (class, constructor) in &library.classes {
            self.insert_class(class, constructor.clone())?;
        }
        info!("Loaded library {} ({} classes)", name, library.classes.len());
        Ok(library.class_names())
    }

    /// Construct a component of `class` named `name`.
    pub fn create(&self, class: &str, name: &str, args: &Value) -> ComponentResult<Arc<Component>> {
        let constructor = self
            .classes
            .get(class)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ComponentError::ClassNotFound(class.to_string()))?;
        let component = constructor(Component::builder(name).class(class), args)?;
        if component.name() != name {
            return Err(ComponentError::Configuration(format!(
                "class {} built component {} instead of {}",
                class,
                component.name(),
                name
            )));
        }
        Ok(component)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Class names in sorted order.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn library_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

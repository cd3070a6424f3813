//! Module declarations and the catalog the context loads them from.
//!
//! A module is an explicit value: its properties, states and configuration
//! defaults are assembled by declaration code and handed to the context.

use std::collections::BTreeMap;
use std::fmt;

use arbiter_config::ConfigMap;
use serde_json::Value;

use crate::property::Property;
use crate::state::State;

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    config: ConfigMap,
    dependencies: Vec<String>,
    properties: Vec<Property>,
    states: Vec<State>,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ConfigMap::new(),
            dependencies: Vec::new(),
            properties: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Declare a configuration key with its default value.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.config.insert(key.into(), default.into());
        self
    }

    /// Another module that must be registered first.
    #[must_use]
    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        let module = module.into();
        if !self.dependencies.contains(&module) {
            self.dependencies.push(module);
        }
        self
    }

    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property.in_module(self.name.clone()));
        self
    }

    #[must_use]
    pub fn state(mut self, state: State) -> Self {
        self.states.push(state.in_module(self.name.clone()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config_defaults(&self) -> &ConfigMap {
        &self.config
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }
}

type Declaration = fn() -> Module;

/// Name → declaration lookup used by [`crate::Context::add_module`].
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    declarations: BTreeMap<String, Declaration>,
}

impl ModuleCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, declaration: Declaration) -> Self {
        self.register(name, declaration);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, declaration: Declaration) {
        self.declarations.insert(name.into(), declaration);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Produce the module declared under `name`.
    #[must_use]
    pub fn load(&self, name: &str) -> Option<Module> {
        self.declarations.get(name).map(|declare| declare())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.declarations.keys()).finish()
    }
}

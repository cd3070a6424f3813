//! Per-module key/value configuration.

use std::collections::BTreeMap;

use serde_json::Value;

pub type ConfigMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct ModuleConfig {
    defaults: ConfigMap,
    overrides: ConfigMap,
}

/// Runtime configuration store.
///
/// Module defaults and file overrides are kept apart, so an override wins
/// no matter which of the two arrived first.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    modules: BTreeMap<String, ModuleConfig>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the defaults a module declares. Re-registering replaces them.
    pub fn add_module_defaults(&mut self, module: &str, defaults: ConfigMap) {
        self.modules.entry(module.to_string()).or_default().defaults = defaults;
    }

    pub fn apply_overrides(&mut self, module: &str, overrides: ConfigMap) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .overrides
            .extend(overrides);
    }

    #[must_use]
    pub fn get(&self, module: &str, key: &str) -> Option<&Value> {
        let config = self.modules.get(module)?;
        config
            .overrides
            .get(key)
            .or_else(|| config.defaults.get(key))
    }

    /// Numeric lookup; integers are widened.
    #[must_use]
    pub fn get_f64(&self, module: &str, key: &str) -> Option<f64> {
        self.get(module, key).and_then(Value::as_f64)
    }

}

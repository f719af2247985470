use menagerie_abi::EntryPoints;
use std::collections::HashMap;

use super::error::FactoryError;
use super::loader::{ModuleSource, PluginModule};

/// In-process module source: plugin entry points registered by name and
/// linked into the host binary.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    modules: HashMap<String, EntryPoints>,
}

impl StaticRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a module
    pub fn register(&mut self, name: impl Into<String>, entry_points: EntryPoints) -> &mut Self {
        self.modules.insert(name.into(), entry_points);
        self
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, entry_points: EntryPoints) -> Self {
        self.register(name, entry_points);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered module names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleSource for StaticRegistry {
    fn open(&self, name: &str) -> Result<PluginModule, FactoryError> {
        self.modules
            .get(name)
            .map(|entry_points| PluginModule::from_static(name, *entry_points))
            .ok_or_else(|| FactoryError::ModuleNotFound {
                module: name.to_string(),
                reason: "not registered".to_string(),
            })
    }
}

//! Read-only lookup of toolchains by language id

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, Toolchain};

/// Immutable mapping from language id to its pipeline description
///
/// Cheap to clone; every clone shares the same table.
#[derive(Debug, Clone, Default)]
pub struct ToolchainRegistry {
    toolchains: Arc<HashMap<String, Toolchain>>,
}

impl ToolchainRegistry {
    pub fn new(toolchains: HashMap<String, Toolchain>) -> Self {
        Self {
            toolchains: Arc::new(toolchains),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.toolchains.clone())
    }

    /// Get the pipeline for a language id
    pub fn lookup(&self, id: &str) -> Option<&Toolchain> {
        self.toolchains.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.toolchains.contains_key(id)
    }

    /// Registered language ids in sorted order
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.toolchains.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Registered toolchains sorted by language id
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Toolchain)> {
        let mut entries: Vec<_> = self
            .toolchains
            .iter()
            .map(|(id, toolchain)| (id.as_str(), toolchain))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.toolchains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolchains.is_empty()
    }
}

//! Resource sources
//!
//! A resource source hands the registrar a snapshot of every resource
//! manager that may hold in-doubt branches. Later additions are not seen.

use std::fmt;
use std::sync::Arc;

use crate::xa::XaResource;

/// One resource manager as enumerated by a source
#[derive(Clone)]
pub struct ResourceEntry {
    /// Stable name; must match the name the resource used when it took part
    /// in transactions so in-doubt branches can be matched to it
    pub name: String,
    pub resource: Arc<dyn XaResource>,
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>, resource: Arc<dyn XaResource>) -> Self {
        Self {
            name: name.into(),
            resource,
        }
    }
}

impl fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Enumerates the resource managers taking part in recovery
pub trait ResourceSource {
    /// Snapshot in a deterministic order for this call
    fn enumerate_resources(&self) -> Vec<ResourceEntry>;
}

/// Fixed list of resources, enumerated in insertion order
#[derive(Debug, Clone, Default)]
pub struct StaticResourceSource {
    entries: Vec<ResourceEntry>,
}

impl StaticResourceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, resource: Arc<dyn XaResource>) -> Self {
        self.entries.push(ResourceEntry::new(name, resource));
        self
    }

    pub fn push(&mut self, entry: ResourceEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceSource for StaticResourceSource {
    fn enumerate_resources(&self) -> Vec<ResourceEntry> {
        self.entries.clone()
    }
}

impl FromIterator<ResourceEntry> for StaticResourceSource {
    fn from_iter<I: IntoIterator<Item = ResourceEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

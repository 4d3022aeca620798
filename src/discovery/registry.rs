//! Service descriptions and the registry table replicated to every process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

use super::IdString;

/// Maximum number of distinct services a registry holds.
pub const MAX_SERVICE_REGISTRY_ENTRIES: usize = 1024;

/// A (service, instance, event) triple identifying an offered service.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub service: IdString,
    pub instance: IdString,
    pub event: IdString,
}

impl ServiceDescription {
    /// Build a description from raw identifiers.
    pub fn new(service: &str, instance: &str, event: &str) -> Result<Self, DiscoveryError> {
        Ok(Self {
            service: IdString::new(service)?,
            instance: IdString::new(instance)?,
            event: IdString::new(event)?,
        })
    }

    /// Returns true if every present filter equals the matching field.
    #[must_use]
    pub fn matches(&self, service: Option<&IdString>, instance: Option<&IdString>, event: Option<&IdString>) -> bool {
        service.map_or(true, |s| *s == self.service)
            && instance.map_or(true, |i| *i == self.instance)
            && event.map_or(true, |e| *e == self.event)
    }
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.instance, self.event)
    }
}

/// One registry row.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub description: ServiceDescription,
    pub publisher_count: u32,
}

/// Ordered table of offered services.
///
/// Order is insertion order; lookups return rows in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistry {
    entries: Vec<RegistryEntry>,
}

impl ServiceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry offering each description once, in iteration order.
    pub fn from_descriptions(
        descriptions: impl IntoIterator<Item = ServiceDescription>,
    ) -> Result<Self, DiscoveryError> {
        let mut registry = Self::new();
        for description in descriptions {
            registry.add_publisher(description)?;
        }
        Ok(registry)
    }

    /// Record one more publisher of `description`.
    ///
    /// # Errors
    /// `RegistryFull` if `description` is new and the table is full.
    pub fn add_publisher(&mut self, description: ServiceDescription) -> Result<(), DiscoveryError> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.description == description) {
            entry.publisher_count = entry.publisher_count.saturating_add(1);
            return Ok(());
        }

        if self.entries.len() >= MAX_SERVICE_REGISTRY_ENTRIES {
            return Err(DiscoveryError::RegistryFull {
                capacity: MAX_SERVICE_REGISTRY_ENTRIES,
            });
        }

        self.entries.push(RegistryEntry {
            description,
            publisher_count: 1,
        });
        Ok(())
    }

    /// Drop one publisher of `description`; the row goes away at zero.
    ///
    /// Unknown descriptions are ignored.
    pub fn remove_publisher(&mut self, description: &ServiceDescription) {
        let Some(pos) = self.entries.iter().position(|e| e.description == *description) else {
            return;
        };

        let entry = &mut self.entries[pos];
        entry.publisher_count = entry.publisher_count.saturating_sub(1);
        if entry.publisher_count == 0 {
            self.entries.remove(pos);
        }
    }

    /// Rows matching every present filter, in registry order.
    pub fn find<'a>(
        &'a self,
        service: Option<&'a IdString>,
        instance: Option<&'a IdString>,
        event: Option<&'a IdString>,
    ) -> impl Iterator<Item = &'a RegistryEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.description.matches(service, instance, event))
    }

    /// All rows.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no service is offered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

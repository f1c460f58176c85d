//! Unit registry.

use crate::error::RegistryError;
use ignite_core::{UnitDescriptor, UnitName};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of known units.
///
/// Units keep the order they were registered in; that order is the
/// tie-break the scheduler uses between units with no constraint between
/// them.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: Vec<Arc<UnitDescriptor>>,
    by_name: HashMap<UnitName, usize>,
}

impl UnitRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit.
    pub fn register(&mut self, unit: UnitDescriptor) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&unit.name) {
            return Err(RegistryError::DuplicateUnit(unit.name));
        }

        self.by_name.insert(unit.name.clone(), self.units.len());
        self.units.push(Arc::new(unit));
        Ok(())
    }

    /// Register several units in order.
    pub fn register_all(
        &mut self,
        units: impl IntoIterator<Item = UnitDescriptor>,
    ) -> Result<(), RegistryError> {
        units.into_iter().try_for_each(|unit| self.register(unit))
    }

    /// Get a unit by name.
    pub fn get(&self, name: &str) -> Option<&Arc<UnitDescriptor>> {
        self.by_name.get(name).map(|&index| &self.units[index])
    }

    /// Registration index of a unit.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Get a unit together with its registration index.
    pub fn entry(&self, name: &str) -> Option<(usize, &Arc<UnitDescriptor>)> {
        self.by_name.get(name).map(|&index| (index, &self.units[index]))
    }

    /// Get a unit by registration index.
    pub fn at(&self, index: usize) -> Option<&Arc<UnitDescriptor>> {
        self.units.get(index)
    }

    /// Members of the group `group`, in registration order.
    pub fn members(&self, group: &str) -> Vec<(usize, &Arc<UnitDescriptor>)> {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.groups.iter().any(|name| name.as_str() == group))
            .collect()
    }

    /// Check if a unit is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// List all units in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<UnitDescriptor>> {
        self.units.iter()
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

//! Capability interfaces and their linearization
//!
//! A capability declares its own methods and the capabilities it extends.
//! The order in which a composite's capabilities are walked is fixed and
//! documented here, because it decides which of several eligible mixins
//! wins a tie.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::ModelError;
use crate::names::{CapabilityName, MethodRef, Tag};

/// Declaration of one capability interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: CapabilityName,
    /// Direct super-capabilities, in declaration order
    #[serde(default)]
    pub extends: Vec<CapabilityName>,
    /// Methods declared directly on this capability
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<CapabilityName>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
            methods: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<CapabilityName>) -> Self {
        self.extends.push(parent.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Methods declared directly on this capability
    pub fn method_refs(&self) -> impl Iterator<Item = MethodRef> + '_ {
        self.methods
            .iter()
            .map(|m| MethodRef::new(self.name.clone(), m.clone()))
    }
}

/// All capabilities known to a catalog, in registration order
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    capabilities: IndexMap<CapabilityName, CapabilityDescriptor>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: CapabilityDescriptor) -> Result<(), ModelError> {
        if self.capabilities.contains_key(&descriptor.name) {
            return Err(ModelError::DuplicateCapability(descriptor.name));
        }
        self.capabilities.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Check that every `extends` reference exists and the hierarchy is acyclic
    pub fn validate(&self) -> Result<(), ModelError> {
        for descriptor in self.capabilities.values() {
            for parent in &descriptor.extends {
                if !self.contains(parent.as_str()) {
                    return Err(ModelError::UnknownCapability {
                        capability: parent.clone(),
                        referenced_by: format!("capability '{}'", descriptor.name),
                    });
                }
            }
        }

        for descriptor in self.capabilities.values() {
            let mut path = vec![descriptor.name.clone()];
            self.check_acyclic(descriptor, &mut path)?;
        }
        Ok(())
    }

    fn check_acyclic(
        &self,
        descriptor: &CapabilityDescriptor,
        path: &mut Vec<CapabilityName>,
    ) -> Result<(), ModelError> {
        for parent in &descriptor.extends {
            if path.contains(parent) {
                let mut cycle = path.clone();
                cycle.push(parent.clone());
                return Err(ModelError::CyclicCapabilityHierarchy(cycle));
            }
            if let Some(parent_descriptor) = self.get(parent.as_str()) {
                path.push(parent.clone());
                self.check_acyclic(parent_descriptor, path)?;
                path.pop();
            }
        }
        Ok(())
    }

    /// Linearize a list of capabilities.
    ///
    /// The traversal is a depth-first pre-order walk: each root in the
    /// given order, immediately followed by its super-capabilities
    /// (recursively, in their declared `extends` order). A capability that
    /// was already emitted is skipped, so the first occurrence fixes its
    /// position.
    ///
    /// For `A extends [B, C]`, `B extends [D]`, `C extends [D]` the
    /// linearization of `[A]` is `[A, B, D, C]`.
    pub fn linearize(&self, roots: &[CapabilityName]) -> Vec<CapabilityName> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for root in roots {
            self.linearize_into(root, &mut seen, &mut order);
        }
        order
    }

    fn linearize_into(
        &self,
        name: &CapabilityName,
        seen: &mut HashSet<CapabilityName>,
        order: &mut Vec<CapabilityName>,
    ) {
        if !seen.insert(name.clone()) {
            return;
        }
        order.push(name.clone());
        if let Some(descriptor) = self.get(name.as_str()) {
            for parent in &descriptor.extends {
                self.linearize_into(parent, seen, order);
            }
        }
    }

    /// Does `candidate` satisfy `target`, i.e. is it `target` or one of its
    /// sub-capabilities?
    pub fn is_assignable(&self, target: &CapabilityName, candidate: &CapabilityName) -> bool {
        target == candidate
            || self
                .linearize(std::slice::from_ref(candidate))
                .iter()
                .any(|c| c == target)
    }

    /// Does any of `types` satisfy `target`?
    pub fn any_assignable(&self, target: &CapabilityName, types: &[CapabilityName]) -> bool {
        types.iter().any(|t| self.is_assignable(target, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> CapabilityCatalog {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .insert(CapabilityDescriptor::new("A").extends("B").extends("C"))
            .unwrap();
        catalog
            .insert(CapabilityDescriptor::new("B").extends("D"))
            .unwrap();
        catalog
            .insert(CapabilityDescriptor::new("C").extends("D"))
            .unwrap();
        catalog.insert(CapabilityDescriptor::new("D")).unwrap();
        catalog
    }

    #[test]
    fn test_linearize_is_depth_first_preorder() {
        let catalog = diamond();
        let order = catalog.linearize(&["A".into()]);
        let names: Vec<&str> = order.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn test_linearize_multiple_roots_keeps_first_position() {
        let catalog = diamond();
        let order = catalog.linearize(&["C".into(), "A".into()]);
        let names: Vec<&str> = order.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn test_is_assignable_follows_hierarchy() {
        let catalog = diamond();
        assert!(catalog.is_assignable(&"D".into(), &"A".into()));
        assert!(catalog.is_assignable(&"A".into(), &"A".into()));
        assert!(!catalog.is_assignable(&"A".into(), &"D".into()));
        assert!(!catalog.is_assignable(&"B".into(), &"C".into()));
    }

    #[test]
    fn test_validate_rejects_unknown_parent() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .insert(CapabilityDescriptor::new("A").extends("Missing"))
            .unwrap();
        let err = catalog.validate().unwrap_err();
        assert!(matches!(err, ModelError::UnknownCapability { .. }));
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .insert(CapabilityDescriptor::new("A").extends("B"))
            .unwrap();
        catalog
            .insert(CapabilityDescriptor::new("B").extends("A"))
            .unwrap();
        let err = catalog.validate().unwrap_err();
        assert!(matches!(err, ModelError::CyclicCapabilityHierarchy(_)));
        assert!(err.to_string().contains("A → B → A"));
    }

    #[test]
    fn test_duplicate_capability_rejected() {
        let mut catalog = CapabilityCatalog::new();
        catalog.insert(CapabilityDescriptor::new("A")).unwrap();
        let err = catalog.insert(CapabilityDescriptor::new("A")).unwrap_err();
        assert_eq!(err, ModelError::DuplicateCapability("A".into()));
    }
}

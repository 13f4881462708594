//! Catalog registration API
//!
//! The catalog replaces attribute scanning: capabilities, fragments, and
//! composites are registered explicitly, then `build()` validates every
//! cross-reference and freezes the result.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::capability::{CapabilityCatalog, CapabilityDescriptor};
use crate::composite::{CompositeDeclaration, CompositeDescriptor};
use crate::error::ModelError;
use crate::fragment::{AppliesTo, DependencySlot, InterceptorDescriptor, MixinDescriptor, ModifiesSlot};
use crate::names::{CapabilityName, CompositeName, FragmentName};

/// Immutable set of descriptors, shared by every resolution
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    capabilities: CapabilityCatalog,
    mixins: IndexMap<FragmentName, Arc<MixinDescriptor>>,
    interceptors: IndexMap<FragmentName, Arc<InterceptorDescriptor>>,
    composites: IndexMap<CompositeName, Arc<CompositeDescriptor>>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn capabilities(&self) -> &CapabilityCatalog {
        &self.capabilities
    }

    pub fn mixin(&self, name: &str) -> Option<&Arc<MixinDescriptor>> {
        self.mixins.get(name)
    }

    pub fn interceptor(&self, name: &str) -> Option<&Arc<InterceptorDescriptor>> {
        self.interceptors.get(name)
    }

    pub fn composite(&self, name: &str) -> Option<&Arc<CompositeDescriptor>> {
        self.composites.get(name)
    }

    pub fn composites(&self) -> impl Iterator<Item = &Arc<CompositeDescriptor>> {
        self.composites.values()
    }

    /// Interceptors declared directly on a mixin, in declaration order
    pub fn interceptors_of(&self, mixin: &MixinDescriptor) -> Vec<Arc<InterceptorDescriptor>> {
        mixin
            .interceptors
            .iter()
            .filter_map(|name| self.interceptors.get(name).cloned())
            .collect()
    }
}

/// Collects declarations; `build()` checks and freezes them
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    capabilities: Vec<CapabilityDescriptor>,
    mixins: Vec<MixinDescriptor>,
    interceptors: Vec<InterceptorDescriptor>,
    composites: Vec<CompositeDeclaration>,
}

impl CatalogBuilder {
    pub fn capability(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.capabilities.push(descriptor);
        self
    }

    pub fn mixin(mut self, descriptor: MixinDescriptor) -> Self {
        self.mixins.push(descriptor);
        self
    }

    pub fn interceptor(mut self, descriptor: InterceptorDescriptor) -> Self {
        self.interceptors.push(descriptor);
        self
    }

    pub fn composite(mut self, declaration: CompositeDeclaration) -> Self {
        self.composites.push(declaration);
        self
    }

    pub fn add_capability(&mut self, descriptor: CapabilityDescriptor) {
        self.capabilities.push(descriptor);
    }

    pub fn add_mixin(&mut self, descriptor: MixinDescriptor) {
        self.mixins.push(descriptor);
    }

    pub fn add_interceptor(&mut self, descriptor: InterceptorDescriptor) {
        self.interceptors.push(descriptor);
    }

    pub fn add_composite(&mut self, declaration: CompositeDeclaration) {
        self.composites.push(declaration);
    }

    pub fn build(self) -> Result<Catalog, ModelError> {
        let mut capabilities = CapabilityCatalog::new();
        for descriptor in self.capabilities {
            capabilities.insert(descriptor)?;
        }
        capabilities.validate()?;

        let mut mixins = IndexMap::new();
        for mixin in self.mixins {
            let name = mixin.name().clone();
            if mixins.contains_key(&name) {
                return Err(ModelError::DuplicateFragment(name));
            }
            mixins.insert(name, Arc::new(mixin));
        }

        let mut interceptors = IndexMap::new();
        for interceptor in self.interceptors {
            let name = interceptor.name().clone();
            if mixins.contains_key(&name) || interceptors.contains_key(&name) {
                return Err(ModelError::DuplicateFragment(name));
            }
            interceptors.insert(name, Arc::new(interceptor));
        }

        for mixin in mixins.values() {
            let owner = format!("mixin '{}'", mixin.name());
            check_capabilities(&capabilities, &mixin.fragment.implements, &owner)?;
            check_slots(&capabilities, &mixin.uses, &owner)?;
            check_applies_to(&capabilities, mixin.applies_to(), &owner)?;
            for interceptor in &mixin.interceptors {
                if !interceptors.contains_key(interceptor) {
                    return Err(ModelError::UnknownFragment {
                        fragment: interceptor.clone(),
                        role: "interceptor",
                        referenced_by: owner.clone(),
                    });
                }
            }
        }

        for interceptor in interceptors.values() {
            let owner = format!("interceptor '{}'", interceptor.name());
            check_capabilities(&capabilities, &interceptor.fragment.implements, &owner)?;
            check_slots(&capabilities, &interceptor.uses, &owner)?;
            check_applies_to(&capabilities, &interceptor.applies_to, &owner)?;
            if let ModifiesSlot::Capability(target) = &interceptor.modifies {
                check_capabilities(&capabilities, std::slice::from_ref(target), &owner)?;
            }
        }

        let mut composites = IndexMap::new();
        let declared: Vec<CompositeName> = self.composites.iter().map(|c| c.name.clone()).collect();
        for declaration in self.composites {
            let name = declaration.name.clone();
            if composites.contains_key(&name) {
                return Err(ModelError::DuplicateComposite(name));
            }
            let owner = format!("composite '{}'", name);

            if declaration.exposes.is_empty() {
                return Err(ModelError::EmptyComposite(name));
            }
            check_capabilities(&capabilities, &declaration.exposes, &owner)?;

            if let Some(inner) = &declaration.wraps {
                if !declared.contains(inner) {
                    return Err(ModelError::UnknownComposite {
                        composite: inner.clone(),
                        referenced_by: owner,
                    });
                }
            }

            let composite_mixins = declaration
                .mixins
                .iter()
                .map(|m| {
                    mixins.get(m).cloned().ok_or_else(|| ModelError::UnknownFragment {
                        fragment: m.clone(),
                        role: "mixin",
                        referenced_by: owner.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let composite_interceptors = declaration
                .interceptors
                .iter()
                .map(|i| {
                    interceptors
                        .get(i)
                        .cloned()
                        .ok_or_else(|| ModelError::UnknownFragment {
                            fragment: i.clone(),
                            role: "interceptor",
                            referenced_by: owner.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let descriptor = CompositeDescriptor::new(
                declaration,
                &capabilities,
                composite_mixins,
                composite_interceptors,
            );
            tracing::debug!(
                composite = %descriptor.name,
                capabilities = descriptor.capabilities.len(),
                mixins = descriptor.mixins.len(),
                "registered composite"
            );
            composites.insert(name, Arc::new(descriptor));
        }

        Ok(Catalog {
            capabilities,
            mixins,
            interceptors,
            composites,
        })
    }
}

fn check_capabilities(
    capabilities: &CapabilityCatalog,
    names: &[CapabilityName],
    owner: &str,
) -> Result<(), ModelError> {
    match names.iter().find(|c| !capabilities.contains(c.as_str())) {
        Some(missing) => Err(ModelError::UnknownCapability {
            capability: missing.clone(),
            referenced_by: owner.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_slots(
    capabilities: &CapabilityCatalog,
    slots: &[DependencySlot],
    owner: &str,
) -> Result<(), ModelError> {
    for slot in slots {
        check_capabilities(capabilities, std::slice::from_ref(&slot.capability), owner)?;
    }
    Ok(())
}

fn check_applies_to(
    capabilities: &CapabilityCatalog,
    filters: &[AppliesTo],
    owner: &str,
) -> Result<(), ModelError> {
    for filter in filters {
        if let AppliesTo::Capability(capability) = filter {
            check_capabilities(capabilities, std::slice::from_ref(capability), owner)?;
        }
    }
    Ok(())
}

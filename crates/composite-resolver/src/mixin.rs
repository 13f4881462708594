//! Mixin resolver
//!
//! Picks, for each capability of a composite, the one mixin that backs it.
//! Candidates are walked in a fixed order (specific mixins in declaration
//! order, then generic catch-alls). A candidate is ruled out only when one
//! of its required slots asks for a capability some mixin here could back
//! while the wrapped composite has nothing for it. The first candidate not
//! ruled out is committed, and from then on a slot with no provider at all
//! fails resolution instead of moving on to the next candidate. There is no
//! global search: a committed choice is never revisited.
//!
//! Delegation comes last. Only once every own candidate has been ruled out
//! does the resolver look at the wrapped composite, and then it reuses the
//! binding that composite already made rather than re-walking its mixins as
//! further candidates here.

use composite_model::{
    AppliesTo, AppliesToContext, CapabilityCatalog, CapabilityName, Catalog, CompositeDescriptor,
    CompositeName, MixinDescriptor,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dependency::DependencyResolver;
use crate::error::ResolutionError;
use crate::resolved::ResolvedComposite;

/// Whether a binding is served by the composite itself or delegated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "composite", rename_all = "kebab-case")]
pub enum BindingOrigin {
    Own,
    /// Delegated to the wrapped composite of that name
    Wrapped(CompositeName),
}

/// The mixin chosen for one capability
#[derive(Debug, Clone)]
pub struct MixinBinding {
    pub capability: CapabilityName,
    pub mixin: Arc<MixinDescriptor>,
    pub origin: BindingOrigin,
}

impl MixinBinding {
    pub fn is_delegated(&self) -> bool {
        matches!(self.origin, BindingOrigin::Wrapped(_))
    }
}

/// Per-composite mixin selection, memoized per capability
#[derive(Debug)]
pub struct MixinResolver<'a> {
    catalog: &'a Catalog,
    composite: &'a CompositeDescriptor,
    dependencies: DependencyResolver<'a>,
    wrapped: Option<&'a ResolvedComposite>,
    resolved: IndexMap<CapabilityName, MixinBinding>,
}

impl<'a> MixinResolver<'a> {
    pub fn new(
        catalog: &'a Catalog,
        composite: &'a CompositeDescriptor,
        dependencies: DependencyResolver<'a>,
        wrapped: Option<&'a ResolvedComposite>,
    ) -> Self {
        Self {
            catalog,
            composite,
            dependencies,
            wrapped,
            resolved: IndexMap::new(),
        }
    }

    /// Resolve the mixin for `capability`, reusing earlier results
    pub fn resolve(&mut self, capability: &CapabilityName) -> Result<MixinBinding, ResolutionError> {
        if let Some(binding) = self.resolved.get(capability) {
            return Ok(binding.clone());
        }

        let binding = self.select(capability)?;
        self.resolved.insert(capability.clone(), binding.clone());
        Ok(binding)
    }

    /// All bindings made so far, in resolution order
    pub fn into_bindings(self) -> IndexMap<CapabilityName, MixinBinding> {
        self.resolved
    }

    /// Candidate mixins for `capability`, in the order they are tried
    pub fn candidates(&self, capability: &CapabilityName) -> Vec<Arc<MixinDescriptor>> {
        let capabilities = self.catalog.capabilities();

        let specific = self
            .composite
            .mixins
            .iter()
            .filter(|m| !m.is_generic() && m.fragment.satisfies(capabilities, capability));

        let generic = self
            .composite
            .mixins
            .iter()
            .filter(|m| {
                m.is_generic() && generic_applies(capabilities, &self.composite.name, m, capability)
            });

        specific.chain(generic).cloned().collect()
    }

    fn select(&self, capability: &CapabilityName) -> Result<MixinBinding, ResolutionError> {
        for mixin in self.candidates(capability) {
            if let Some(slot) = self.dependencies.first_invalid(&mixin.uses, capability) {
                tracing::debug!(
                    composite = %self.composite.name,
                    capability = %capability,
                    mixin = %mixin.name(),
                    slot = %slot,
                    "rejected mixin candidate"
                );
                continue;
            }

            // Committed: a missing provider is fatal from here on.
            if let Some(slot) = self.dependencies.first_unsatisfied(&mixin.uses, capability)? {
                return Err(self.dependencies.unsatisfiable(slot));
            }

            tracing::debug!(
                composite = %self.composite.name,
                capability = %capability,
                mixin = %mixin.name(),
                generic = mixin.is_generic(),
                "selected mixin"
            );
            return Ok(MixinBinding {
                capability: capability.clone(),
                mixin,
                origin: BindingOrigin::Own,
            });
        }

        self.delegate(capability).ok_or_else(|| ResolutionError::UnresolvedCapability {
            composite: self.composite.name.clone(),
            capability: capability.clone(),
        })
    }

    /// One level of delegation: the wrapped composite's own binding
    fn delegate(&self, capability: &CapabilityName) -> Option<MixinBinding> {
        let wrapped = self.wrapped?;
        let capabilities = self.catalog.capabilities();

        let binding = wrapped
            .mixin_for(capability)
            .or_else(|| {
                wrapped
                    .bindings()
                    .values()
                    .find(|b| b.mixin.fragment.satisfies(capabilities, capability))
            })
            .filter(|b| !b.is_delegated())?;

        tracing::debug!(
            composite = %self.composite.name,
            capability = %capability,
            wrapped = %wrapped.name(),
            mixin = %binding.mixin.name(),
            "delegated capability to wrapped composite"
        );
        Some(MixinBinding {
            capability: capability.clone(),
            mixin: binding.mixin.clone(),
            origin: BindingOrigin::Wrapped(wrapped.name().clone()),
        })
    }
}

/// Whether a generic mixin's `appliesTo` filters admit `capability`
pub(crate) fn generic_applies(
    capabilities: &CapabilityCatalog,
    composite: &CompositeName,
    mixin: &MixinDescriptor,
    capability: &CapabilityName,
) -> bool {
    let filters = mixin.applies_to();
    if filters.is_empty() {
        return true;
    }

    filters.iter().any(|filter| match filter {
        AppliesTo::Capability(target) => capabilities.is_assignable(target, capability),
        AppliesTo::Tag(tag) => capabilities
            .get(capability.as_str())
            .is_some_and(|descriptor| descriptor.tags.contains(tag)),
        AppliesTo::Filter(predicate) => predicate.applies_to(&AppliesToContext {
            composite,
            capability,
            method: None,
            mixin: None,
            fragment: mixin.name(),
        }),
    })
}

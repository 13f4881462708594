//! Dependency resolver
//!
//! Matches `uses` slots against providers, in priority order: sibling
//! mixins of the same composite, mixins of the wrapped composite, then the
//! external registry.

use composite_model::{
    CapabilityCatalog, CapabilityName, CompositeDescriptor, DependencySlot, MixinDescriptor,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;
use crate::mixin::{BindingOrigin, MixinBinding, generic_applies};
use crate::provider::{Provider, ProviderOrigin, ProviderRegistry, ProviderRequest};
use crate::resolved::ResolvedComposite;

/// The provider chosen for one slot; `None` only for optional slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBinding {
    pub slot: DependencySlot,
    pub provider: Option<Provider>,
}

impl SlotBinding {
    pub fn is_absent(&self) -> bool {
        self.provider.is_none()
    }
}

/// Slot matching for one composite
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    capabilities: &'a CapabilityCatalog,
    composite: &'a CompositeDescriptor,
    wrapped: Option<&'a ResolvedComposite>,
    external: &'a dyn ProviderRegistry,
    bindings: Option<&'a IndexMap<CapabilityName, MixinBinding>>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        capabilities: &'a CapabilityCatalog,
        composite: &'a CompositeDescriptor,
        wrapped: Option<&'a ResolvedComposite>,
        external: &'a dyn ProviderRegistry,
    ) -> Self {
        Self {
            capabilities,
            composite,
            wrapped,
            external,
            bindings: None,
        }
    }

    /// Prefer the mixins actually bound to a capability over the first
    /// structural match
    pub fn with_bindings(mut self, bindings: &'a IndexMap<CapabilityName, MixinBinding>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Find a provider for `slot`, or `None` if nothing matches
    pub fn supply(&self, slot: &DependencySlot) -> Result<Option<Provider>, ResolutionError> {
        let request = ProviderRequest::from_slot(slot);

        if let Some(provider) = self.from_siblings(&request) {
            return Ok(Some(provider));
        }
        if let Some(provider) = self.from_wrapped(&request) {
            return Ok(Some(provider));
        }
        self.external.supply(self.capabilities, &request)
    }

    pub fn can_supply(&self, slot: &DependencySlot) -> Result<bool, ResolutionError> {
        Ok(self.supply(slot)?.is_some())
    }

    /// Bind a slot, failing if a non-optional slot has no provider
    pub fn bind(&self, slot: &DependencySlot) -> Result<SlotBinding, ResolutionError> {
        let provider = self.supply(slot)?;
        if provider.is_none() && !slot.optional {
            return Err(self.unsatisfiable(slot));
        }
        if let Some(provider) = &provider {
            tracing::trace!(slot = %slot, origin = %provider.origin, "bound dependency slot");
        }
        Ok(SlotBinding {
            slot: slot.clone(),
            provider,
        })
    }

    pub fn bind_all(&self, slots: &[DependencySlot]) -> Result<Vec<SlotBinding>, ResolutionError> {
        slots.iter().map(|slot| self.bind(slot)).collect()
    }

    /// The first non-optional slot that nothing can fill.
    ///
    /// Slots requesting `serving` itself are skipped, since the fragment
    /// being validated is what will provide it.
    pub fn first_unsatisfied<'s>(
        &self,
        slots: &'s [DependencySlot],
        serving: &CapabilityName,
    ) -> Result<Option<&'s DependencySlot>, ResolutionError> {
        for slot in slots {
            if slot.optional || slot.capability == *serving {
                continue;
            }
            if !self.can_supply(slot)? {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// The first slot that rules a candidate out.
    ///
    /// That is a required slot, other than `serving`, whose capability some
    /// mixin of this composite could back but which the wrapped composite
    /// cannot supply. Without a wrapped composite nothing is ruled out; a
    /// committed candidate then fails on binding instead.
    pub fn first_invalid<'s>(
        &self,
        slots: &'s [DependencySlot],
        serving: &CapabilityName,
    ) -> Option<&'s DependencySlot> {
        if self.wrapped.is_none() {
            return None;
        }
        slots.iter().find(|slot| {
            !slot.optional
                && slot.capability != *serving
                && self.is_resolvable(&slot.capability)
                && self.from_wrapped(&ProviderRequest::from_slot(slot)).is_none()
        })
    }

    /// Whether some mixin declared on this composite could back `capability`
    pub fn is_resolvable(&self, capability: &CapabilityName) -> bool {
        self.composite.mixins.iter().any(|mixin| {
            if mixin.is_generic() {
                generic_applies(self.capabilities, &self.composite.name, mixin, capability)
            } else {
                mixin.fragment.satisfies(self.capabilities, capability)
            }
        })
    }

    pub fn unsatisfiable(&self, slot: &DependencySlot) -> ResolutionError {
        ResolutionError::UnsatisfiableDependency {
            composite: self.composite.name.clone(),
            fragment: slot.declared_by.clone(),
            slot: slot.clone(),
        }
    }

    fn from_siblings(&self, request: &ProviderRequest<'_>) -> Option<Provider> {
        if let Some(bindings) = self.bindings {
            let bound = bindings.values().find_map(|binding| {
                let origin = match &binding.origin {
                    BindingOrigin::Own => ProviderOrigin::Sibling {
                        mixin: binding.mixin.name().clone(),
                    },
                    BindingOrigin::Wrapped(composite) => ProviderOrigin::Wrapped {
                        composite: composite.clone(),
                        mixin: binding.mixin.name().clone(),
                    },
                };
                self.offer(&binding.capability, origin, request)
            });
            if bound.is_some() {
                return bound;
            }
        }

        self.composite.mixins.iter().find_map(|mixin| {
            self.structural(mixin, request, || ProviderOrigin::Sibling {
                mixin: mixin.name().clone(),
            })
        })
    }

    fn from_wrapped(&self, request: &ProviderRequest<'_>) -> Option<Provider> {
        let wrapped = self.wrapped?;
        let origin = |mixin: &MixinDescriptor| ProviderOrigin::Wrapped {
            composite: wrapped.name().clone(),
            mixin: mixin.name().clone(),
        };

        wrapped
            .bindings()
            .values()
            .filter(|binding| binding.origin == BindingOrigin::Own)
            .find_map(|binding| self.offer(&binding.capability, origin(binding.mixin.as_ref()), request))
            .or_else(|| {
                wrapped
                    .used_mixins()
                    .iter()
                    .find_map(|mixin| self.structural(mixin, request, || origin(mixin.as_ref())))
            })
    }

    fn structural(
        &self,
        mixin: &MixinDescriptor,
        request: &ProviderRequest<'_>,
        origin: impl Fn() -> ProviderOrigin,
    ) -> Option<Provider> {
        mixin
            .fragment
            .implements
            .iter()
            .find_map(|capability| self.offer(capability, origin(), request))
    }

    fn offer(
        &self,
        capability: &CapabilityName,
        origin: ProviderOrigin,
        request: &ProviderRequest<'_>,
    ) -> Option<Provider> {
        let provider = Provider {
            capability: capability.clone(),
            name: None,
            dependent: None,
            origin,
        };
        provider
            .matches(self.capabilities, request)
            .then_some(provider)
    }
}

//! Interceptor chain builder
//!
//! For each method, interceptors are collected from three tiers and the
//! tier order is the wrap order (first element outermost):
//!
//! 1. composite-level interceptors
//! 2. interceptors declared on the mixin backing the method
//! 3. interceptors declared on the other mixins in use
//!
//! A candidate is kept only if its `appliesTo` filter matches, it
//! implements the method's capability (unless generic), it overrides the
//! method (if partial), and no required slot is ruled out the same way a
//! mixin candidate's would be. An accepted interceptor whose slot has no
//! provider at all is skipped with a warning, or fails resolution under
//! strict settings.

use composite_model::{
    AppliesTo, AppliesToContext, CapabilityName, Catalog, CompositeDescriptor, FragmentName,
    InterceptorDescriptor, InterceptorKind, MethodRef, MixinDescriptor,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::dependency::DependencyResolver;
use crate::error::ResolutionError;
use crate::mixin::{BindingOrigin, MixinBinding};
use crate::settings::ResolverSettings;

/// Resolved call plan for one method
#[derive(Debug, Clone)]
pub struct MethodPlan {
    pub method: MethodRef,
    /// The mixin at the end of the chain
    pub mixin: Arc<MixinDescriptor>,
    pub origin: BindingOrigin,
    /// Concerns and side-effects, outermost first
    pub chain: Vec<Arc<InterceptorDescriptor>>,
}

impl MethodPlan {
    pub fn concerns(&self) -> impl Iterator<Item = &Arc<InterceptorDescriptor>> {
        self.of_kind(InterceptorKind::Concern)
    }

    pub fn side_effects(&self) -> impl Iterator<Item = &Arc<InterceptorDescriptor>> {
        self.of_kind(InterceptorKind::SideEffect)
    }

    pub fn interceptor_names(&self) -> Vec<&FragmentName> {
        self.chain.iter().map(|i| i.name()).collect()
    }

    fn of_kind(&self, kind: InterceptorKind) -> impl Iterator<Item = &Arc<InterceptorDescriptor>> {
        self.chain.iter().filter(move |i| i.kind == kind)
    }
}

/// Builds method plans for one composite once its mixins are bound
pub struct InterceptorChainBuilder<'a> {
    catalog: &'a Catalog,
    composite: &'a CompositeDescriptor,
    bindings: &'a IndexMap<CapabilityName, MixinBinding>,
    used_mixins: &'a [Arc<MixinDescriptor>],
    dependencies: DependencyResolver<'a>,
    settings: ResolverSettings,
}

impl<'a> InterceptorChainBuilder<'a> {
    pub fn new(
        catalog: &'a Catalog,
        composite: &'a CompositeDescriptor,
        bindings: &'a IndexMap<CapabilityName, MixinBinding>,
        used_mixins: &'a [Arc<MixinDescriptor>],
        dependencies: DependencyResolver<'a>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            catalog,
            composite,
            bindings,
            used_mixins,
            dependencies,
            settings,
        }
    }

    pub fn chain_for(&self, method: &MethodRef) -> Result<MethodPlan, ResolutionError> {
        let binding = self.bindings.get(&method.capability).ok_or_else(|| {
            ResolutionError::UnresolvedCapability {
                composite: self.composite.name.clone(),
                capability: method.capability.clone(),
            }
        })?;

        let mut accepted: Vec<Arc<InterceptorDescriptor>> = Vec::new();
        let mut seen: HashSet<FragmentName> = HashSet::new();

        for candidate in self.candidates(binding) {
            if !seen.insert(candidate.name().clone()) {
                continue;
            }
            if self.accepts(&candidate, method, binding)? {
                accepted.push(candidate);
            }
        }

        tracing::debug!(
            composite = %self.composite.name,
            method = %method,
            mixin = %binding.mixin.name(),
            chain = ?accepted.iter().map(|i| i.name().as_str()).collect::<Vec<_>>(),
            "assembled interceptor chain"
        );

        Ok(MethodPlan {
            method: method.clone(),
            mixin: binding.mixin.clone(),
            origin: binding.origin.clone(),
            chain: accepted,
        })
    }

    /// Candidates in tier order, possibly with repeats
    fn candidates(&self, binding: &MixinBinding) -> Vec<Arc<InterceptorDescriptor>> {
        let mut candidates = self.composite.interceptors.clone();

        // A delegated mixin carries its own chain inside the wrapped composite.
        if binding.origin == BindingOrigin::Own {
            candidates.extend(self.catalog.interceptors_of(&binding.mixin));
        }

        for mixin in self.used_mixins {
            if mixin.name() != binding.mixin.name() {
                candidates.extend(self.catalog.interceptors_of(mixin));
            }
        }
        candidates
    }

    fn accepts(
        &self,
        interceptor: &InterceptorDescriptor,
        method: &MethodRef,
        binding: &MixinBinding,
    ) -> Result<bool, ResolutionError> {
        let capabilities = self.catalog.capabilities();

        if !self.applies(interceptor, method, binding) {
            tracing::trace!(interceptor = %interceptor.name(), method = %method, "appliesTo filter did not match");
            return Ok(false);
        }

        if !interceptor.generic {
            if !interceptor.fragment.satisfies(capabilities, &method.capability) {
                tracing::trace!(interceptor = %interceptor.name(), method = %method, "does not implement capability");
                return Ok(false);
            }
            if !interceptor.fragment.overrides_method(&method.name) {
                tracing::trace!(interceptor = %interceptor.name(), method = %method, "partial, method not overridden");
                return Ok(false);
            }
        }

        if let Some(slot) = self.dependencies.first_invalid(&interceptor.uses, &method.capability) {
            tracing::trace!(interceptor = %interceptor.name(), method = %method, slot = %slot, "wrapped composite cannot supply dependency");
            return Ok(false);
        }

        if let Some(slot) = self
            .dependencies
            .first_unsatisfied(&interceptor.uses, &method.capability)?
        {
            if self.settings.strict_interceptor_dependencies {
                return Err(self.dependencies.unsatisfiable(slot));
            }
            tracing::warn!(
                composite = %self.composite.name,
                interceptor = %interceptor.name(),
                method = %method,
                slot = %slot,
                "skipping interceptor with unsatisfiable dependency"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// No filters means everywhere; several filters are alternatives
    fn applies(&self, interceptor: &InterceptorDescriptor, method: &MethodRef, binding: &MixinBinding) -> bool {
        if interceptor.applies_to.is_empty() {
            return true;
        }

        let capabilities = self.catalog.capabilities();
        let mixin = &binding.mixin;

        interceptor.applies_to.iter().any(|filter| match filter {
            AppliesTo::Tag(tag) => {
                mixin.fragment.carries_tag(tag)
                    || (!mixin.is_generic() && mixin.fragment.method_carries_tag(&method.name, tag))
            }
            AppliesTo::Capability(target) => {
                mixin.fragment.satisfies(capabilities, target)
                    || capabilities.is_assignable(target, &method.capability)
            }
            AppliesTo::Filter(predicate) => predicate.applies_to(&AppliesToContext {
                composite: &self.composite.name,
                capability: &method.capability,
                method: Some(method),
                mixin: Some(mixin.name()),
                fragment: interceptor.name(),
            }),
        })
    }
}

//! The resolved composite and its exported plan

use composite_model::{
    CapabilityName, CompositeDescriptor, CompositeName, FragmentName, InterceptorKind, MethodRef,
    MixinDescriptor,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::MethodPlan;
use crate::dependency::SlotBinding;
use crate::mixin::{BindingOrigin, MixinBinding};

/// Immutable resolution result for one composite type.
///
/// Produced once by the engine and shared read-only afterwards.
#[derive(Debug)]
pub struct ResolvedComposite {
    descriptor: Arc<CompositeDescriptor>,
    wrapped: Option<Arc<ResolvedComposite>>,
    bindings: IndexMap<CapabilityName, MixinBinding>,
    methods: IndexMap<MethodRef, MethodPlan>,
    used_mixins: Vec<Arc<MixinDescriptor>>,
    mixin_order: Vec<FragmentName>,
    dependencies: IndexMap<FragmentName, Vec<SlotBinding>>,
}

/// Everything a `ResolvedComposite` is assembled from
#[derive(Debug)]
pub(crate) struct ResolvedParts {
    pub descriptor: Arc<CompositeDescriptor>,
    pub wrapped: Option<Arc<ResolvedComposite>>,
    pub bindings: IndexMap<CapabilityName, MixinBinding>,
    pub methods: IndexMap<MethodRef, MethodPlan>,
    pub used_mixins: Vec<Arc<MixinDescriptor>>,
    pub mixin_order: Vec<FragmentName>,
    pub dependencies: IndexMap<FragmentName, Vec<SlotBinding>>,
}

impl ResolvedComposite {
    pub(crate) fn new(parts: ResolvedParts) -> Self {
        Self {
            descriptor: parts.descriptor,
            wrapped: parts.wrapped,
            bindings: parts.bindings,
            methods: parts.methods,
            used_mixins: parts.used_mixins,
            mixin_order: parts.mixin_order,
            dependencies: parts.dependencies,
        }
    }

    pub fn name(&self) -> &CompositeName {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Arc<CompositeDescriptor> {
        &self.descriptor
    }

    pub fn wrapped(&self) -> Option<&Arc<ResolvedComposite>> {
        self.wrapped.as_ref()
    }

    /// Capability to mixin, in linearization order
    pub fn bindings(&self) -> &IndexMap<CapabilityName, MixinBinding> {
        &self.bindings
    }

    pub fn mixin_for(&self, capability: &CapabilityName) -> Option<&MixinBinding> {
        self.bindings.get(capability)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodPlan> {
        self.methods.values()
    }

    pub fn chain_for(&self, method: &MethodRef) -> Option<&MethodPlan> {
        self.methods.get(method)
    }

    /// Look a method up by capability and method name
    pub fn method(&self, capability: &str, name: &str) -> Option<&MethodPlan> {
        self.chain_for(&MethodRef::new(capability, name))
    }

    /// Mixins backing at least one capability of this composite itself,
    /// in first-use order
    pub fn used_mixins(&self) -> &[Arc<MixinDescriptor>] {
        &self.used_mixins
    }

    /// Used mixins, each after the sibling mixins it depends on
    pub fn mixin_order(&self) -> &[FragmentName] {
        &self.mixin_order
    }

    /// Slot bindings for a used mixin or an interceptor in any chain
    pub fn dependencies_of(&self, fragment: &str) -> Option<&[SlotBinding]> {
        self.dependencies.get(fragment).map(Vec::as_slice)
    }

    pub fn dependencies(&self) -> &IndexMap<FragmentName, Vec<SlotBinding>> {
        &self.dependencies
    }

    /// Serializable view for downstream dispatch builders
    pub fn plan(&self) -> CompositePlan {
        CompositePlan {
            composite: self.name().clone(),
            wraps: self.wrapped.as_ref().map(|w| w.name().clone()),
            capabilities: self
                .bindings
                .values()
                .map(|binding| CapabilityPlan {
                    capability: binding.capability.clone(),
                    mixin: binding.mixin.name().clone(),
                    origin: binding.origin.clone(),
                })
                .collect(),
            methods: self
                .methods
                .values()
                .map(|plan| MethodPlanEntry {
                    method: plan.method.clone(),
                    mixin: plan.mixin.name().clone(),
                    chain: plan
                        .chain
                        .iter()
                        .map(|interceptor| ChainEntry {
                            interceptor: interceptor.name().clone(),
                            kind: interceptor.kind,
                        })
                        .collect(),
                })
                .collect(),
            mixin_order: self.mixin_order.clone(),
            dependencies: self
                .dependencies
                .iter()
                .map(|(fragment, slots)| DependencyEntry {
                    fragment: fragment.clone(),
                    slots: slots.clone(),
                })
                .collect(),
        }
    }
}

/// Exported form of a resolved composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositePlan {
    pub composite: CompositeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wraps: Option<CompositeName>,
    pub capabilities: Vec<CapabilityPlan>,
    pub methods: Vec<MethodPlanEntry>,
    pub mixin_order: Vec<FragmentName>,
    pub dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPlan {
    pub capability: CapabilityName,
    pub mixin: FragmentName,
    pub origin: BindingOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPlanEntry {
    pub method: MethodRef,
    pub mixin: FragmentName,
    pub chain: Vec<ChainEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub interceptor: FragmentName,
    pub kind: InterceptorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub fragment: FragmentName,
    pub slots: Vec<SlotBinding>,
}

//! Composite descriptors
//!
//! A `CompositeDeclaration` names its capabilities and fragments; the
//! catalog turns it into an immutable `CompositeDescriptor` once every
//! reference has been checked and the capability list linearized.

use std::sync::Arc;

use crate::capability::CapabilityCatalog;
use crate::fragment::{InterceptorDescriptor, MixinDescriptor};
use crate::names::{CapabilityName, CompositeName, FragmentName, MethodRef};

/// Unchecked declaration of a composite type
#[derive(Debug, Clone)]
pub struct CompositeDeclaration {
    pub name: CompositeName,
    pub exposes: Vec<CapabilityName>,
    pub mixins: Vec<FragmentName>,
    pub interceptors: Vec<FragmentName>,
    pub wraps: Option<CompositeName>,
}

impl CompositeDeclaration {
    pub fn new(name: impl Into<CompositeName>) -> Self {
        Self {
            name: name.into(),
            exposes: Vec::new(),
            mixins: Vec::new(),
            interceptors: Vec::new(),
            wraps: None,
        }
    }

    pub fn exposes(mut self, capability: impl Into<CapabilityName>) -> Self {
        self.exposes.push(capability.into());
        self
    }

    pub fn mixin(mut self, mixin: impl Into<FragmentName>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    /// Declare a composite-level interceptor
    pub fn interceptor(mut self, interceptor: impl Into<FragmentName>) -> Self {
        self.interceptors.push(interceptor.into());
        self
    }

    /// Delegate to an inner composite
    pub fn wraps(mut self, inner: impl Into<CompositeName>) -> Self {
        self.wraps = Some(inner.into());
        self
    }
}

/// Immutable description of one composite type
#[derive(Debug, Clone)]
pub struct CompositeDescriptor {
    pub name: CompositeName,
    /// Capabilities as declared
    pub exposes: Vec<CapabilityName>,
    /// Declared capabilities plus inherited ones, in linearization order
    pub capabilities: Vec<CapabilityName>,
    pub mixins: Vec<Arc<MixinDescriptor>>,
    /// Composite-level interceptors
    pub interceptors: Vec<Arc<InterceptorDescriptor>>,
    pub wraps: Option<CompositeName>,
}

impl CompositeDescriptor {
    pub(crate) fn new(
        declaration: CompositeDeclaration,
        capabilities: &CapabilityCatalog,
        mixins: Vec<Arc<MixinDescriptor>>,
        interceptors: Vec<Arc<InterceptorDescriptor>>,
    ) -> Self {
        let linearized = capabilities.linearize(&declaration.exposes);
        Self {
            name: declaration.name,
            exposes: declaration.exposes,
            capabilities: linearized,
            mixins,
            interceptors,
            wraps: declaration.wraps,
        }
    }

    /// Every method of every exposed capability, in linearization order
    pub fn methods(&self, capabilities: &CapabilityCatalog) -> Vec<MethodRef> {
        self.capabilities
            .iter()
            .filter_map(|name| capabilities.get(name.as_str()))
            .flat_map(|descriptor| descriptor.method_refs())
            .collect()
    }

    pub fn mixin(&self, name: &str) -> Option<&Arc<MixinDescriptor>> {
        self.mixins.iter().find(|m| m.name() == name)
    }
}

//! Fragment descriptors: mixins, interceptors, and their slots
//!
//! A fragment is an implementation type contributed to a composite. Mixins
//! back capability methods; interceptors (concerns and side-effects) wrap
//! method calls. Both may declare dependency slots ("uses").
//!
//! Descriptors are built through `MixinBuilder` / `InterceptorBuilder`,
//! whose `build()` rejects malformed declarations regardless of which
//! composite the fragment ends up in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::capability::CapabilityCatalog;
use crate::error::ModelError;
use crate::names::{CapabilityName, CompositeName, FragmentName, MethodRef, Tag};

/// The implementation type behind a fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentType {
    pub name: FragmentName,
    /// Capabilities this type implements directly
    pub implements: Vec<CapabilityName>,
    /// Type-level tags
    pub tags: BTreeSet<Tag>,
    /// Tags on this type's own method overrides, by method name
    pub method_tags: BTreeMap<String, BTreeSet<Tag>>,
    /// For partial fragments, the methods actually overridden.
    /// `None` means the type overrides every method it implements.
    pub overrides: Option<BTreeSet<String>>,
}

impl FragmentType {
    pub fn new(name: impl Into<FragmentName>) -> Self {
        Self {
            name: name.into(),
            implements: Vec::new(),
            tags: BTreeSet::new(),
            method_tags: BTreeMap::new(),
            overrides: None,
        }
    }

    /// Whether this type implements `capability`, directly or through a
    /// sub-capability it implements
    pub fn satisfies(&self, capabilities: &CapabilityCatalog, capability: &CapabilityName) -> bool {
        capabilities.any_assignable(capability, &self.implements)
    }

    pub fn carries_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn method_carries_tag(&self, method: &str, tag: &Tag) -> bool {
        self.method_tags
            .get(method)
            .is_some_and(|tags| tags.contains(tag))
    }

    pub fn overrides_method(&self, method: &str) -> bool {
        match &self.overrides {
            Some(methods) => methods.contains(method),
            None => true,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.overrides.is_some()
    }
}

/// Everything an `AppliesToFilter` gets to look at
#[derive(Debug, Clone, Copy)]
pub struct AppliesToContext<'a> {
    pub composite: &'a CompositeName,
    pub capability: &'a CapabilityName,
    /// `None` while choosing a mixin for a whole capability
    pub method: Option<&'a MethodRef>,
    /// The mixin resolved for the capability, once known
    pub mixin: Option<&'a FragmentName>,
    /// The fragment whose applicability is being decided
    pub fragment: &'a FragmentName,
}

/// User-supplied applicability predicate
pub trait AppliesToFilter: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    fn applies_to(&self, context: &AppliesToContext<'_>) -> bool;
}

/// Restriction on where a generic fragment may apply
#[derive(Clone)]
pub enum AppliesTo {
    /// The target mixin (or its override of the method) must carry the tag
    Tag(Tag),
    /// The target must satisfy the capability
    Capability(CapabilityName),
    /// Arbitrary predicate
    Filter(Arc<dyn AppliesToFilter>),
}

impl AppliesTo {
    pub fn tag(tag: impl Into<Tag>) -> Self {
        Self::Tag(tag.into())
    }

    pub fn capability(capability: impl Into<CapabilityName>) -> Self {
        Self::Capability(capability.into())
    }

    pub fn filter(filter: impl AppliesToFilter + 'static) -> Self {
        Self::Filter(Arc::new(filter))
    }
}

impl fmt::Debug for AppliesTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliesTo::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            AppliesTo::Capability(c) => f.debug_tuple("Capability").field(c).finish(),
            AppliesTo::Filter(filter) => f.debug_tuple("Filter").field(&filter.name()).finish(),
        }
    }
}

impl fmt::Display for AppliesTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliesTo::Tag(tag) => write!(f, "tag {}", tag),
            AppliesTo::Capability(c) => write!(f, "capability {}", c),
            AppliesTo::Filter(filter) => write!(f, "filter {}", filter.name()),
        }
    }
}

/// A declared requirement for another capability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySlot {
    pub capability: CapabilityName,
    pub name: Option<String>,
    pub optional: bool,
    /// Fragment that declares this slot
    pub declared_by: FragmentName,
    /// Only providers declared for this dependent type may fill the slot
    pub owner: Option<FragmentName>,
}

impl fmt::Display for DependencySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uses {}", self.capability)?;
        if let Some(name) = &self.name {
            write!(f, " named '{}'", name)?;
        }
        if self.optional {
            f.write_str(" (optional)")?;
        }
        write!(f, " on {}", self.declared_by)
    }
}

/// What an interceptor wraps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModifiesSlot {
    /// The next element in the chain, typed as this capability
    Capability(CapabilityName),
    /// The next element as an untyped invocation handler
    Invocation,
}

impl ModifiesSlot {
    /// Parse the catalog-file shorthand, where `*` means any invocation
    pub fn parse(value: &str) -> Self {
        if value == "*" {
            ModifiesSlot::Invocation
        } else {
            ModifiesSlot::Capability(CapabilityName::new(value))
        }
    }
}

/// Specific mixins claim the capabilities their type implements; generic
/// mixins are catch-alls, optionally restricted by `appliesTo`
#[derive(Debug, Clone)]
pub enum MixinKind {
    Specific,
    Generic(Vec<AppliesTo>),
}

/// A fragment that backs capability methods
#[derive(Debug, Clone)]
pub struct MixinDescriptor {
    pub fragment: FragmentType,
    pub kind: MixinKind,
    pub uses: Vec<DependencySlot>,
    /// Interceptors declared directly on this mixin, in declaration order
    pub interceptors: Vec<FragmentName>,
}

impl MixinDescriptor {
    pub fn builder(name: impl Into<FragmentName>) -> MixinBuilder {
        MixinBuilder::new(name)
    }

    pub fn name(&self) -> &FragmentName {
        &self.fragment.name
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, MixinKind::Generic(_))
    }

    pub fn applies_to(&self) -> &[AppliesTo] {
        match &self.kind {
            MixinKind::Specific => &[],
            MixinKind::Generic(filters) => filters,
        }
    }
}

/// Interceptors either wrap the call or observe its outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterceptorKind {
    Concern,
    SideEffect,
}

impl fmt::Display for InterceptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorKind::Concern => write!(f, "concern"),
            InterceptorKind::SideEffect => write!(f, "side-effect"),
        }
    }
}

/// A fragment that wraps method calls
#[derive(Debug, Clone)]
pub struct InterceptorDescriptor {
    pub fragment: FragmentType,
    pub kind: InterceptorKind,
    pub generic: bool,
    pub applies_to: Vec<AppliesTo>,
    pub modifies: ModifiesSlot,
    pub uses: Vec<DependencySlot>,
}

impl InterceptorDescriptor {
    pub fn concern(name: impl Into<FragmentName>) -> InterceptorBuilder {
        InterceptorBuilder::new(name, InterceptorKind::Concern)
    }

    pub fn side_effect(name: impl Into<FragmentName>) -> InterceptorBuilder {
        InterceptorBuilder::new(name, InterceptorKind::SideEffect)
    }

    pub fn name(&self) -> &FragmentName {
        &self.fragment.name
    }
}

/// Declaration state shared by both fragment builders
#[derive(Debug, Clone)]
pub struct FragmentDeclaration {
    fragment: FragmentType,
    uses: Vec<DependencySlot>,
    modifies: Vec<ModifiesSlot>,
    applies_to: Vec<AppliesTo>,
    generic: bool,
}

impl FragmentDeclaration {
    fn new(name: FragmentName) -> Self {
        Self {
            fragment: FragmentType::new(name),
            uses: Vec::new(),
            modifies: Vec::new(),
            applies_to: Vec::new(),
            generic: false,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ModelError {
        ModelError::MalformedFragmentDeclaration {
            fragment: self.fragment.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Builder methods common to mixins and interceptors
pub trait DeclareFragment: Sized {
    fn declaration(&mut self) -> &mut FragmentDeclaration;

    fn implements(mut self, capability: impl Into<CapabilityName>) -> Self {
        self.declaration().fragment.implements.push(capability.into());
        self
    }

    fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.declaration().fragment.tags.insert(tag.into());
        self
    }

    fn method_tag(mut self, method: impl Into<String>, tag: impl Into<Tag>) -> Self {
        self.declaration()
            .fragment
            .method_tags
            .entry(method.into())
            .or_default()
            .insert(tag.into());
        self
    }

    /// Mark the type as partial, overriding only the listed methods
    fn overrides<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let overrides = self
            .declaration()
            .fragment
            .overrides
            .get_or_insert_with(BTreeSet::new);
        overrides.extend(methods.into_iter().map(Into::into));
        self
    }

    fn generic(mut self) -> Self {
        self.declaration().generic = true;
        self
    }

    fn applies_to(mut self, filter: AppliesTo) -> Self {
        self.declaration().applies_to.push(filter);
        self
    }

    fn uses(self, capability: impl Into<CapabilityName>) -> Self {
        self.slot(capability, None, false, None)
    }

    fn uses_optional(self, capability: impl Into<CapabilityName>) -> Self {
        self.slot(capability, None, true, None)
    }

    fn uses_named(self, capability: impl Into<CapabilityName>, name: impl Into<String>) -> Self {
        self.slot(capability, Some(name.into()), false, None)
    }

    fn slot(
        mut self,
        capability: impl Into<CapabilityName>,
        name: Option<String>,
        optional: bool,
        owner: Option<FragmentName>,
    ) -> Self {
        let declaration = self.declaration();
        let declared_by = declaration.fragment.name.clone();
        declaration.uses.push(DependencySlot {
            capability: capability.into(),
            name,
            optional,
            declared_by,
            owner,
        });
        self
    }

    fn modifies(mut self, slot: ModifiesSlot) -> Self {
        self.declaration().modifies.push(slot);
        self
    }
}

/// Builder for `MixinDescriptor`
#[derive(Debug, Clone)]
pub struct MixinBuilder {
    declaration: FragmentDeclaration,
    interceptors: Vec<FragmentName>,
}

impl MixinBuilder {
    pub fn new(name: impl Into<FragmentName>) -> Self {
        Self {
            declaration: FragmentDeclaration::new(name.into()),
            interceptors: Vec::new(),
        }
    }

    /// Declare an interceptor directly on this mixin
    pub fn interceptor(mut self, name: impl Into<FragmentName>) -> Self {
        self.interceptors.push(name.into());
        self
    }

    pub fn build(self) -> Result<MixinDescriptor, ModelError> {
        let declaration = self.declaration;

        // A mixin is the end of the chain; it has nothing to wrap.
        if !declaration.modifies.is_empty() {
            return Err(declaration.malformed(format!(
                "mixins cannot declare a modifies slot, found {}",
                declaration.modifies.len()
            )));
        }
        if !declaration.generic && !declaration.applies_to.is_empty() {
            return Err(declaration.malformed("appliesTo is only meaningful on generic mixins"));
        }
        if !declaration.generic && declaration.fragment.implements.is_empty() {
            return Err(declaration.malformed("specific mixin implements no capability"));
        }

        let kind = if declaration.generic {
            MixinKind::Generic(declaration.applies_to)
        } else {
            MixinKind::Specific
        };

        Ok(MixinDescriptor {
            fragment: declaration.fragment,
            kind,
            uses: declaration.uses,
            interceptors: self.interceptors,
        })
    }
}

impl DeclareFragment for MixinBuilder {
    fn declaration(&mut self) -> &mut FragmentDeclaration {
        &mut self.declaration
    }
}

/// Builder for `InterceptorDescriptor`
#[derive(Debug, Clone)]
pub struct InterceptorBuilder {
    declaration: FragmentDeclaration,
    kind: InterceptorKind,
}

impl InterceptorBuilder {
    pub fn new(name: impl Into<FragmentName>, kind: InterceptorKind) -> Self {
        Self {
            declaration: FragmentDeclaration::new(name.into()),
            kind,
        }
    }

    /// Shorthand for a generic interceptor wrapping any invocation
    pub fn around_any_invocation(self) -> Self {
        self.generic().modifies(ModifiesSlot::Invocation)
    }

    pub fn build(self) -> Result<InterceptorDescriptor, ModelError> {
        let mut declaration = self.declaration;

        let modifies = match declaration.modifies.len() {
            1 => declaration.modifies.remove(0),
            0 => return Err(declaration.malformed("no modifies slot declared")),
            n => {
                return Err(declaration.malformed(format!(
                    "exactly one modifies slot is allowed, found {}",
                    n
                )));
            }
        };

        match &modifies {
            ModifiesSlot::Invocation if !declaration.generic => {
                return Err(declaration.malformed(
                    "only generic interceptors may modify an untyped invocation",
                ));
            }
            ModifiesSlot::Capability(target)
                if !declaration.generic
                    && !declaration.fragment.implements.contains(target) =>
            {
                // The typed next element must be something this type implements.
                declaration.fragment.implements.push(target.clone());
            }
            _ => {}
        }

        Ok(InterceptorDescriptor {
            fragment: declaration.fragment,
            kind: self.kind,
            generic: declaration.generic,
            applies_to: declaration.applies_to,
            modifies,
            uses: declaration.uses,
        })
    }
}

impl DeclareFragment for InterceptorBuilder {
    fn declaration(&mut self) -> &mut FragmentDeclaration {
        &mut self.declaration
    }
}

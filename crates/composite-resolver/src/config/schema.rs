//! Catalog file schema
//!
//! A catalog file declares capabilities, fragments, composites, and
//! external services, plus resolver and logging settings. Every section is
//! optional so partial files parse.

use composite_model::{
    AppliesTo, CapabilityDescriptor, CapabilityName, Catalog, CompositeDeclaration,
    CompositeName, DeclareFragment, FragmentName, InterceptorBuilder, InterceptorDescriptor,
    InterceptorKind, MixinBuilder, MixinDescriptor, ModelError, ModifiesSlot, Tag,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use crate::engine::ResolutionEngine;
use crate::error::ResolutionError;
use crate::logging::LoggingSettings;
use crate::provider::{ExternalService, StaticProviderRegistry};
use crate::settings::ResolverSettings;

/// Root of a catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub settings: ResolverSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default, rename = "capability", skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityDescriptor>,

    #[serde(default, rename = "mixin", skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<MixinConfig>,

    #[serde(default, rename = "interceptor", skip_serializing_if = "Vec::is_empty")]
    pub interceptors: Vec<InterceptorConfig>,

    #[serde(default, rename = "composite", skip_serializing_if = "Vec::is_empty")]
    pub composites: Vec<CompositeConfig>,

    #[serde(default, rename = "service", skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ExternalService>,
}

/// A `uses` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub capability: CapabilityName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub optional: bool,
    /// Only providers reserved for this dependent type may fill the slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<FragmentName>,
}

/// `appliesTo` restrictions expressible in a file; predicates need code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliesToConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityName>,
}

impl AppliesToConfig {
    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.capabilities.is_empty()
    }

    fn filters(&self) -> impl Iterator<Item = AppliesTo> + '_ {
        self.tags
            .iter()
            .map(|t| AppliesTo::Tag(t.clone()))
            .chain(self.capabilities.iter().map(|c| AppliesTo::Capability(c.clone())))
    }
}

/// Declaration fields shared by mixins and interceptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<CapabilityName>,
    #[serde(default)]
    pub generic: bool,
    #[serde(default, skip_serializing_if = "AppliesToConfig::is_empty")]
    pub applies_to: AppliesToConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<SlotConfig>,
    /// Capability names, or `*` for an untyped invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub method_tags: BTreeMap<String, Vec<Tag>>,
    /// Methods overridden by a partial fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<String>>,
}

impl FragmentConfig {
    fn declare<B: DeclareFragment>(&self, mut builder: B) -> B {
        for capability in &self.implements {
            builder = builder.implements(capability.clone());
        }
        if self.generic {
            builder = builder.generic();
        }
        for filter in self.applies_to.filters() {
            builder = builder.applies_to(filter);
        }
        for slot in &self.uses {
            builder = builder.slot(
                slot.capability.clone(),
                slot.name.clone(),
                slot.optional,
                slot.owner.clone(),
            );
        }
        for modifies in &self.modifies {
            builder = builder.modifies(ModifiesSlot::parse(modifies));
        }
        for tag in &self.tags {
            builder = builder.tag(tag.clone());
        }
        for (method, tags) in &self.method_tags {
            for tag in tags {
                builder = builder.method_tag(method.clone(), tag.clone());
            }
        }
        if let Some(methods) = &self.overrides {
            builder = builder.overrides(methods.iter().cloned());
        }
        builder
    }

    fn capability_refs(&self) -> impl Iterator<Item = &CapabilityName> {
        self.implements
            .iter()
            .chain(self.applies_to.capabilities.iter())
            .chain(self.uses.iter().map(|s| &s.capability))
    }
}

/// A `[[mixin]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixinConfig {
    pub name: FragmentName,
    #[serde(flatten)]
    pub fragment: FragmentConfig,
    /// Interceptors declared directly on the mixin
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interceptors: Vec<FragmentName>,
}

impl MixinConfig {
    pub fn to_descriptor(&self) -> Result<MixinDescriptor, ModelError> {
        let mut builder = self.fragment.declare(MixinBuilder::new(self.name.clone()));
        for interceptor in &self.interceptors {
            builder = builder.interceptor(interceptor.clone());
        }
        builder.build()
    }
}

/// An `[[interceptor]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorConfig {
    pub name: FragmentName,
    #[serde(default = "default_kind")]
    pub kind: InterceptorKind,
    #[serde(flatten)]
    pub fragment: FragmentConfig,
}

fn default_kind() -> InterceptorKind {
    InterceptorKind::Concern
}

impl InterceptorConfig {
    pub fn to_descriptor(&self) -> Result<InterceptorDescriptor, ModelError> {
        self.fragment
            .declare(InterceptorBuilder::new(self.name.clone(), self.kind))
            .build()
    }
}

/// A `[[composite]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub name: CompositeName,
    pub exposes: Vec<CapabilityName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<FragmentName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interceptors: Vec<FragmentName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wraps: Option<CompositeName>,
}

impl CompositeConfig {
    fn to_declaration(&self) -> CompositeDeclaration {
        CompositeDeclaration {
            name: self.name.clone(),
            exposes: self.exposes.clone(),
            mixins: self.mixins.clone(),
            interceptors: self.interceptors.clone(),
            wraps: self.wraps.clone(),
        }
    }
}

/// A catalog file turned into the immutable model
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    pub providers: StaticProviderRegistry,
    pub settings: ResolverSettings,
    pub logging: LoggingSettings,
}

impl LoadedCatalog {
    pub fn into_engine(self) -> Result<ResolutionEngine, ResolutionError> {
        Ok(ResolutionEngine::new(self.catalog)?
            .with_providers(self.providers)
            .with_settings(self.settings))
    }
}

impl FromStr for CatalogConfig {
    type Err = toml::de::Error;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content)
    }
}

impl CatalogConfig {
    /// Validate cross-references
    ///
    /// Returns Ok(()) if valid, or Err with a list of error messages
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let capabilities = unique_names(
            self.capabilities.iter().map(|c| c.name.as_str()),
            "capability",
            &mut errors,
        );
        let mixins = unique_names(self.mixins.iter().map(|m| m.name.as_str()), "mixin", &mut errors);
        let interceptors = unique_names(
            self.interceptors.iter().map(|i| i.name.as_str()),
            "interceptor",
            &mut errors,
        );
        let composites = unique_names(
            self.composites.iter().map(|c| c.name.as_str()),
            "composite",
            &mut errors,
        );

        for name in mixins.intersection(&interceptors) {
            errors.push(format!("Fragment '{}' is declared as both mixin and interceptor", name));
        }

        let mut check_capability = |capability: &CapabilityName, owner: &str| {
            if !capabilities.contains(capability.as_str()) {
                errors.push(format!("{} references unknown capability '{}'", owner, capability));
            }
        };

        for capability in &self.capabilities {
            let owner = format!("Capability '{}'", capability.name);
            for parent in &capability.extends {
                check_capability(parent, &owner);
            }
        }
        for mixin in &self.mixins {
            let owner = format!("Mixin '{}'", mixin.name);
            for capability in mixin.fragment.capability_refs() {
                check_capability(capability, &owner);
            }
        }
        for interceptor in &self.interceptors {
            let owner = format!("Interceptor '{}'", interceptor.name);
            for capability in interceptor.fragment.capability_refs() {
                check_capability(capability, &owner);
            }
            for modifies in &interceptor.fragment.modifies {
                if let ModifiesSlot::Capability(capability) = ModifiesSlot::parse(modifies) {
                    check_capability(&capability, &owner);
                }
            }
        }
        for composite in &self.composites {
            let owner = format!("Composite '{}'", composite.name);
            for capability in &composite.exposes {
                check_capability(capability, &owner);
            }
        }
        for service in &self.services {
            check_capability(&service.provides, &format!("Service '{}'", service.id));
        }

        for mixin in &self.mixins {
            for interceptor in &mixin.interceptors {
                if !interceptors.contains(interceptor.as_str()) {
                    errors.push(format!(
                        "Mixin '{}' references unknown interceptor '{}'",
                        mixin.name, interceptor
                    ));
                }
            }
        }

        for composite in &self.composites {
            if composite.exposes.is_empty() {
                errors.push(format!("Composite '{}' exposes no capabilities", composite.name));
            }
            for mixin in &composite.mixins {
                if !mixins.contains(mixin.as_str()) {
                    errors.push(format!(
                        "Composite '{}' references unknown mixin '{}'",
                        composite.name, mixin
                    ));
                }
            }
            for interceptor in &composite.interceptors {
                if !interceptors.contains(interceptor.as_str()) {
                    errors.push(format!(
                        "Composite '{}' references unknown interceptor '{}'",
                        composite.name, interceptor
                    ));
                }
            }
            if let Some(inner) = &composite.wraps {
                if !composites.contains(inner.as_str()) {
                    errors.push(format!(
                        "Composite '{}' wraps non-existent composite '{}'",
                        composite.name, inner
                    ));
                }
            }
        }

        for composite in &self.composites {
            if let Err(e) = self.validate_wrap_chain(composite) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate that a wrap chain doesn't loop back on itself
    fn validate_wrap_chain(&self, composite: &CompositeConfig) -> Result<(), String> {
        let wraps: HashMap<&str, &str> = self
            .composites
            .iter()
            .filter_map(|c| c.wraps.as_ref().map(|w| (c.name.as_str(), w.as_str())))
            .collect();

        let mut visited = HashSet::new();
        let mut chain = vec![composite.name.as_str()];
        let mut current = composite.name.as_str();
        visited.insert(current);

        while let Some(&inner) = wraps.get(current) {
            chain.push(inner);
            if !visited.insert(inner) {
                // Reported once per composite on the cycle
                if inner == composite.name.as_str() {
                    return Err(format!(
                        "Circular wrap dependency detected: {}",
                        chain.join(" → ")
                    ));
                }
                break;
            }
            current = inner;
        }
        Ok(())
    }

    /// Build the immutable model. Fragment declarations are checked here,
    /// independent of the composites that use them.
    pub fn into_model(self) -> Result<LoadedCatalog, ModelError> {
        let mut builder = Catalog::builder();
        for capability in self.capabilities {
            builder.add_capability(capability);
        }
        for mixin in &self.mixins {
            builder.add_mixin(mixin.to_descriptor()?);
        }
        for interceptor in &self.interceptors {
            builder.add_interceptor(interceptor.to_descriptor()?);
        }
        for composite in &self.composites {
            builder.add_composite(composite.to_declaration());
        }

        Ok(LoadedCatalog {
            catalog: builder.build()?,
            providers: self.services.into_iter().collect(),
            settings: self.settings,
            logging: self.logging,
        })
    }
}

fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: &str,
    errors: &mut Vec<String>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            errors.push(format!("Duplicate {} '{}'", kind, name));
        }
    }
    seen
}

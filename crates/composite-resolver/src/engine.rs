//! Resolution engine
//!
//! Owns the catalog, the external providers, and the compute-once cache.
//! `resolve` may be called from any number of threads; each composite is
//! resolved at most once and every caller gets the same `Arc`, or the same
//! cached error.

use composite_model::{Catalog, CompositeDescriptor, CompositeName, FragmentName, MixinDescriptor};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::cache::ResolutionCache;
use crate::chain::InterceptorChainBuilder;
use crate::dependency::{DependencyResolver, SlotBinding};
use crate::error::ResolutionError;
use crate::graph::UsageGraph;
use crate::mixin::{BindingOrigin, MixinResolver};
use crate::provider::{ProviderOrigin, ProviderRegistry, StaticProviderRegistry};
use crate::resolved::{ResolvedComposite, ResolvedParts};
use crate::settings::ResolverSettings;

type Resolution = Result<Arc<ResolvedComposite>, ResolutionError>;

pub struct ResolutionEngine {
    catalog: Arc<Catalog>,
    providers: Arc<dyn ProviderRegistry>,
    settings: ResolverSettings,
    /// Composites with every wrapped composite before its wrapper
    wrap_order: Vec<CompositeName>,
    cache: ResolutionCache<CompositeName, Resolution>,
}

impl fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("composites", &self.wrap_order)
            .field("providers", &self.providers)
            .field("settings", &self.settings)
            .field("computations", &self.cache.computations())
            .finish()
    }
}

impl ResolutionEngine {
    /// Create an engine, rejecting composites that wrap each other in a cycle
    pub fn new(catalog: Catalog) -> Result<Self, ResolutionError> {
        let graph = UsageGraph::new(
            catalog.composites().map(|c| c.name.clone()),
            |name: &CompositeName| {
                catalog
                    .composite(name.as_str())
                    .and_then(|c| c.wraps.clone())
            },
            false,
        );
        let wrap_order = graph
            .resolve_order()
            .map_err(|err| ResolutionError::CyclicComposition(err.cycle))?;

        Ok(Self {
            catalog: Arc::new(catalog),
            providers: Arc::new(StaticProviderRegistry::new()),
            settings: ResolverSettings::default(),
            wrap_order,
            cache: ResolutionCache::new(),
        })
    }

    pub fn with_providers(mut self, providers: impl ProviderRegistry + 'static) -> Self {
        self.providers = Arc::new(providers);
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve a composite, computing it on first use
    pub fn resolve(&self, composite: &str) -> Result<Arc<ResolvedComposite>, ResolutionError> {
        let descriptor = self
            .catalog
            .composite(composite)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownComposite(composite.into()))?;

        self.cache
            .get_or_compute(&descriptor.name, || self.compute(&descriptor))
    }

    /// Resolve every composite, wrapped composites first.
    ///
    /// Stops at the first failure.
    pub fn elaborate(&self) -> Result<Vec<Arc<ResolvedComposite>>, ResolutionError> {
        tracing::info!(composites = self.wrap_order.len(), "elaborating composites");
        self.wrap_order
            .iter()
            .map(|name| self.resolve(name.as_str()))
            .collect()
    }

    /// How many composites have actually been computed, failures included
    pub fn computations(&self) -> usize {
        self.cache.computations()
    }

    fn compute(&self, descriptor: &Arc<CompositeDescriptor>) -> Resolution {
        let span = tracing::info_span!("resolve", composite = %descriptor.name);
        let _guard = span.enter();

        match self.build(descriptor) {
            Ok(resolved) => {
                tracing::info!(
                    capabilities = resolved.bindings().len(),
                    methods = resolved.methods().count(),
                    mixins = resolved.used_mixins().len(),
                    "resolved composite"
                );
                Ok(Arc::new(resolved))
            }
            Err(err) => {
                tracing::error!(error = %err, "composite resolution failed");
                Err(err)
            }
        }
    }

    fn build(&self, descriptor: &Arc<CompositeDescriptor>) -> Result<ResolvedComposite, ResolutionError> {
        let capabilities = self.catalog.capabilities();

        let wrapped = match &descriptor.wraps {
            Some(inner) => Some(self.resolve(inner.as_str())?),
            None => None,
        };

        let dependencies = DependencyResolver::new(
            capabilities,
            descriptor,
            wrapped.as_deref(),
            self.providers.as_ref(),
        );

        // Only capabilities that declare methods need a mixin.
        let mut mixins = MixinResolver::new(&self.catalog, descriptor, dependencies, wrapped.as_deref());
        for capability in &descriptor.capabilities {
            let declares_methods = capabilities
                .get(capability.as_str())
                .is_some_and(|c| !c.methods.is_empty());
            if declares_methods {
                mixins.resolve(capability)?;
            }
        }
        let bindings = mixins.into_bindings();

        let mut used_mixins: Vec<Arc<MixinDescriptor>> = Vec::new();
        for binding in bindings.values() {
            if binding.origin == BindingOrigin::Own
                && !used_mixins.iter().any(|m| m.name() == binding.mixin.name())
            {
                used_mixins.push(binding.mixin.clone());
            }
        }

        let bound = dependencies.with_bindings(&bindings);
        let mut slot_bindings: IndexMap<FragmentName, Vec<SlotBinding>> = IndexMap::new();
        bind_used_mixins(descriptor, bound, &mut used_mixins, &mut slot_bindings)?;

        let mut methods = IndexMap::new();
        let mut interceptor_siblings = Vec::new();
        {
            let chains = InterceptorChainBuilder::new(
                &self.catalog,
                descriptor,
                &bindings,
                &used_mixins,
                bound,
                self.settings,
            );
            for method in descriptor.methods(capabilities) {
                let plan = chains.chain_for(&method)?;
                methods.insert(method, plan);
            }
        }
        for plan in methods.values() {
            for interceptor in &plan.chain {
                if !slot_bindings.contains_key(interceptor.name()) {
                    let slots = bound.bind_all(&interceptor.uses)?;
                    interceptor_siblings.extend(sibling_providers(descriptor, &slots));
                    slot_bindings.insert(interceptor.name().clone(), slots);
                }
            }
        }
        for mixin in interceptor_siblings {
            if !used_mixins.iter().any(|m| m.name() == mixin.name()) {
                used_mixins.push(mixin);
            }
        }
        bind_used_mixins(descriptor, bound, &mut used_mixins, &mut slot_bindings)?;

        let mixin_order = self.mixin_order(&descriptor.name, &used_mixins, &slot_bindings)?;

        Ok(ResolvedComposite::new(ResolvedParts {
            descriptor: descriptor.clone(),
            wrapped,
            bindings,
            methods,
            used_mixins,
            mixin_order,
            dependencies: slot_bindings,
        }))
    }

    /// Order used mixins so each comes after the siblings it uses
    fn mixin_order(
        &self,
        composite: &CompositeName,
        used_mixins: &[Arc<MixinDescriptor>],
        slot_bindings: &IndexMap<FragmentName, Vec<SlotBinding>>,
    ) -> Result<Vec<FragmentName>, ResolutionError> {
        let graph = UsageGraph::new(
            used_mixins.iter().map(|m| m.name().clone()),
            |mixin: &FragmentName| {
                slot_bindings
                    .get(mixin)
                    .into_iter()
                    .flatten()
                    .filter_map(|binding| match &binding.provider {
                        Some(provider) => match &provider.origin {
                            ProviderOrigin::Sibling { mixin: used } if used != mixin => {
                                Some(used.clone())
                            }
                            _ => None,
                        },
                        None => None,
                    })
                    .collect::<Vec<_>>()
            },
            self.settings.allow_cycles,
        );

        graph
            .resolve_order()
            .map_err(|err| ResolutionError::CyclicUsage {
                composite: composite.clone(),
                cycle: err.cycle,
            })
    }
}

/// Bind the slots of every used mixin not bound yet.
///
/// A sibling that supplies one of those slots becomes a used mixin itself,
/// even when it backs no capability, and is bound in turn.
fn bind_used_mixins(
    descriptor: &CompositeDescriptor,
    bound: DependencyResolver<'_>,
    used_mixins: &mut Vec<Arc<MixinDescriptor>>,
    slot_bindings: &mut IndexMap<FragmentName, Vec<SlotBinding>>,
) -> Result<(), ResolutionError> {
    let mut next = 0;
    while next < used_mixins.len() {
        let mixin = used_mixins[next].clone();
        next += 1;
        if slot_bindings.contains_key(mixin.name()) {
            continue;
        }

        let slots = bound.bind_all(&mixin.uses)?;
        for sibling in sibling_providers(descriptor, &slots) {
            if !used_mixins.iter().any(|m| m.name() == sibling.name()) {
                tracing::debug!(mixin = %sibling.name(), used_by = %mixin.name(), "sibling provider joins used mixins");
                used_mixins.push(sibling);
            }
        }
        slot_bindings.insert(mixin.name().clone(), slots);
    }
    Ok(())
}

fn sibling_providers(descriptor: &CompositeDescriptor, slots: &[SlotBinding]) -> Vec<Arc<MixinDescriptor>> {
    slots
        .iter()
        .filter_map(|binding| match &binding.provider {
            Some(provider) => match &provider.origin {
                ProviderOrigin::Sibling { mixin } => descriptor.mixin(mixin.as_str()).cloned(),
                _ => None,
            },
            None => None,
        })
        .collect()
}

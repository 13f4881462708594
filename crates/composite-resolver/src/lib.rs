//! Composite resolution engine
//!
//! Given the descriptors of `composite-model`, computes once per composite:
//!
//! - which mixin backs each exposed capability (`mixin`)
//! - the ordered interceptor chain around each method (`chain`)
//! - how every dependency slot is filled (`dependency`, `provider`)
//!
//! The result is an immutable `ResolvedComposite`, cached by the
//! `ResolutionEngine` so concurrent callers share a single computation.
//! Executing a plan is left to the caller.

pub mod cache;
pub mod chain;
pub mod config;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mixin;
pub mod provider;
pub mod resolved;
pub mod settings;

pub use chain::{InterceptorChainBuilder, MethodPlan};
pub use config::{CatalogConfig, LoadedCatalog, load_catalog};
pub use dependency::{DependencyResolver, SlotBinding};
pub use engine::ResolutionEngine;
pub use error::ResolutionError;
pub use graph::{CycleError, UsageGraph};
pub use logging::LoggingSettings;
pub use mixin::{BindingOrigin, MixinBinding, MixinResolver};
pub use provider::{
    ExternalService, Provider, ProviderOrigin, ProviderRegistry, ProviderRequest,
    StaticProviderRegistry,
};
pub use resolved::{CompositePlan, ResolvedComposite};
pub use settings::ResolverSettings;

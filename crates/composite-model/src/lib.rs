//! Descriptor model for composite types
//!
//! A composite is assembled from fragments rather than written as one
//! concrete type. This crate holds the immutable, declarative description
//! of those pieces:
//!
//! - `capability` - exposed interfaces and their fixed linearization order
//! - `fragment` - mixins, interceptors, and their dependency slots
//! - `composite` - the composite descriptor tying capabilities to fragments
//! - `catalog` - the registration API that validates and freezes everything
//!
//! Nothing here resolves anything; see the `composite-resolver` crate.

pub mod capability;
pub mod catalog;
pub mod composite;
pub mod error;
pub mod fragment;
pub mod names;

pub use capability::{CapabilityCatalog, CapabilityDescriptor};
pub use catalog::{Catalog, CatalogBuilder};
pub use composite::{CompositeDeclaration, CompositeDescriptor};
pub use error::ModelError;
pub use fragment::{
    AppliesTo, AppliesToContext, AppliesToFilter, DeclareFragment, DependencySlot, FragmentType,
    InterceptorBuilder, InterceptorDescriptor, InterceptorKind, MixinBuilder, MixinDescriptor,
    MixinKind, ModifiesSlot,
};
pub use names::{CapabilityName, CompositeName, FragmentName, MethodRef, Tag};

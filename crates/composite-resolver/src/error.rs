use composite_model::{
    CapabilityName, CompositeName, DependencySlot, FragmentName, ModelError,
};
use thiserror::Error;

/// Errors raised while resolving a composite.
///
/// Resolution is deterministic, so every variant describes a broken
/// declaration rather than a transient condition. The type is `Clone` so a
/// cached failure can be handed to every caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("composite '{composite}': no valid mixin for capability '{capability}'")]
    UnresolvedCapability {
        composite: CompositeName,
        capability: CapabilityName,
    },

    #[error("composite '{composite}': unsatisfiable dependency '{slot}' on fragment '{fragment}'")]
    UnsatisfiableDependency {
        composite: CompositeName,
        fragment: FragmentName,
        slot: DependencySlot,
    },

    #[error(
        "ambiguous provider for {capability} named '{name}': {}",
        .candidates.join(", ")
    )]
    AmbiguousOrInvalidNameMatch {
        capability: CapabilityName,
        name: String,
        candidates: Vec<String>,
    },

    #[error("unknown composite '{0}'")]
    UnknownComposite(CompositeName),

    #[error("composites wrap each other in a cycle: {}", format_chain(.0))]
    CyclicComposition(Vec<CompositeName>),

    #[error("composite '{composite}': mixins use each other in a cycle: {}", format_chain(.cycle))]
    CyclicUsage {
        composite: CompositeName,
        cycle: Vec<FragmentName>,
    },
}

impl ResolutionError {
    /// The capability requested by the slot, for unsatisfiable dependencies
    pub fn requested_capability(&self) -> Option<&CapabilityName> {
        match self {
            ResolutionError::UnsatisfiableDependency { slot, .. } => Some(&slot.capability),
            ResolutionError::UnresolvedCapability { capability, .. } => Some(capability),
            _ => None,
        }
    }
}

fn format_chain<T: std::fmt::Display>(chain: &[T]) -> String {
    chain
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" → ")
}

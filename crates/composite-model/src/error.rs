use thiserror::Error;

use crate::names::{CapabilityName, CompositeName, FragmentName};

/// Errors raised while declaring or registering descriptors.
///
/// All of these are programming errors in the composite declarations and
/// are detected before any resolution takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("malformed fragment declaration '{fragment}': {reason}")]
    MalformedFragmentDeclaration {
        fragment: FragmentName,
        reason: String,
    },

    #[error("capability '{0}' is declared more than once")]
    DuplicateCapability(CapabilityName),

    #[error("fragment '{0}' is declared more than once")]
    DuplicateFragment(FragmentName),

    #[error("composite '{0}' is declared more than once")]
    DuplicateComposite(CompositeName),

    #[error("unknown capability '{capability}' referenced by {referenced_by}")]
    UnknownCapability {
        capability: CapabilityName,
        referenced_by: String,
    },

    #[error("unknown {role} '{fragment}' referenced by {referenced_by}")]
    UnknownFragment {
        fragment: FragmentName,
        role: &'static str,
        referenced_by: String,
    },

    #[error("unknown composite '{composite}' referenced by {referenced_by}")]
    UnknownComposite {
        composite: CompositeName,
        referenced_by: String,
    },

    #[error("capability hierarchy is cyclic: {}", format_chain(.0))]
    CyclicCapabilityHierarchy(Vec<CapabilityName>),

    #[error("composite '{0}' exposes no capabilities")]
    EmptyComposite(CompositeName),
}

fn format_chain(chain: &[CapabilityName]) -> String {
    chain
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

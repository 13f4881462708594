use serde::{Deserialize, Serialize};

/// Knobs that change how strictly a composite is resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Fail instead of dropping an applicable interceptor whose
    /// non-optional dependency cannot be supplied
    pub strict_interceptor_dependencies: bool,

    /// Tolerate mixins that use each other in a cycle
    pub allow_cycles: bool,
}

impl ResolverSettings {
    pub fn strict() -> Self {
        Self {
            strict_interceptor_dependencies: true,
            allow_cycles: false,
        }
    }
}

//! Providers for dependency slots
//!
//! A provider is anything that can fill a `uses` slot: a sibling mixin of
//! the same composite, a mixin of the wrapped composite, or an external
//! service registered with a `ProviderRegistry`.

use composite_model::{
    CapabilityCatalog, CapabilityName, CompositeName, DependencySlot, FragmentName,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ResolutionError;

/// Where a provider comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProviderOrigin {
    Sibling {
        mixin: FragmentName,
    },
    Wrapped {
        composite: CompositeName,
        mixin: FragmentName,
    },
    External {
        service: String,
    },
}

impl fmt::Display for ProviderOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderOrigin::Sibling { mixin } => write!(f, "sibling mixin {}", mixin),
            ProviderOrigin::Wrapped { composite, mixin } => {
                write!(f, "mixin {} of wrapped composite {}", mixin, composite)
            }
            ProviderOrigin::External { service } => write!(f, "service {}", service),
        }
    }
}

/// Something able to fill a dependency slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Declared type; satisfies every capability it extends
    pub capability: CapabilityName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Dependent type this provider is reserved for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<FragmentName>,
    pub origin: ProviderOrigin,
}

impl Provider {
    /// Apply the matching rule: type first, then name, then dependent.
    ///
    /// Names and dependents only constrain the match when both sides
    /// carry one, and then they must be equal.
    pub fn matches(&self, capabilities: &CapabilityCatalog, request: &ProviderRequest<'_>) -> bool {
        if !capabilities.is_assignable(request.capability, &self.capability) {
            return false;
        }
        if let (Some(wanted), Some(offered)) = (request.name, self.name.as_deref()) {
            if wanted != offered {
                return false;
            }
        }
        if let (Some(wanted), Some(offered)) = (request.dependent, self.dependent.as_ref()) {
            if wanted != offered {
                return false;
            }
        }
        true
    }
}

/// A query against the providers, usually derived from a slot
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub capability: &'a CapabilityName,
    pub name: Option<&'a str>,
    pub dependent: Option<&'a FragmentName>,
}

impl<'a> ProviderRequest<'a> {
    pub fn new(capability: &'a CapabilityName) -> Self {
        Self {
            capability,
            name: None,
            dependent: None,
        }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn from_slot(slot: &'a DependencySlot) -> Self {
        Self {
            capability: &slot.capability,
            name: slot.name.as_deref(),
            dependent: slot.owner.as_ref(),
        }
    }
}

/// Externally supplied providers
pub trait ProviderRegistry: Send + Sync + fmt::Debug {
    /// Return the provider for `request`, `None` if nothing matches
    fn supply(
        &self,
        capabilities: &CapabilityCatalog,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<Provider>, ResolutionError>;

    fn can_supply(&self, capabilities: &CapabilityCatalog, request: &ProviderRequest<'_>) -> bool {
        matches!(self.supply(capabilities, request), Ok(Some(_)))
    }
}

/// Registry entry for an external service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalService {
    /// Service identity, used in diagnostics and the exported plan
    pub id: String,
    /// Capability the service implements
    pub provides: CapabilityName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<FragmentName>,
}

impl ExternalService {
    pub fn new(id: impl Into<String>, provides: impl Into<CapabilityName>) -> Self {
        Self {
            id: id.into(),
            provides: provides.into(),
            name: None,
            dependent: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn for_dependent(mut self, dependent: impl Into<FragmentName>) -> Self {
        self.dependent = Some(dependent.into());
        self
    }

    fn provider(&self) -> Provider {
        Provider {
            capability: self.provides.clone(),
            name: self.name.clone(),
            dependent: self.dependent.clone(),
            origin: ProviderOrigin::External {
                service: self.id.clone(),
            },
        }
    }
}

/// In-memory registry of external services, in registration order
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    services: Vec<ExternalService>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: ExternalService) {
        self.services.push(service);
    }

    pub fn with(mut self, service: ExternalService) -> Self {
        self.register(service);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ExternalService> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn services(&self) -> &[ExternalService] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl FromIterator<ExternalService> for StaticProviderRegistry {
    fn from_iter<I: IntoIterator<Item = ExternalService>>(iter: I) -> Self {
        Self {
            services: iter.into_iter().collect(),
        }
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn supply(
        &self,
        capabilities: &CapabilityCatalog,
        request: &ProviderRequest<'_>,
    ) -> Result<Option<Provider>, ResolutionError> {
        let matching: Vec<&ExternalService> = self
            .services
            .iter()
            .filter(|s| s.provider().matches(capabilities, request))
            .collect();

        let Some(wanted) = request.name else {
            return Ok(matching.first().map(|s| s.provider()));
        };

        // A service carrying the requested name beats an unnamed one.
        let exact: Vec<&ExternalService> = matching
            .iter()
            .copied()
            .filter(|s| s.name.as_deref() == Some(wanted))
            .collect();

        match exact.as_slice() {
            [] => Ok(matching.first().map(|s| s.provider())),
            [only] => Ok(Some(only.provider())),
            several => Err(ResolutionError::AmbiguousOrInvalidNameMatch {
                capability: request.capability.clone(),
                name: wanted.to_string(),
                candidates: several.iter().map(|s| s.id.clone()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composite_model::CapabilityDescriptor;

    fn capabilities() -> CapabilityCatalog {
        let mut capabilities = CapabilityCatalog::new();
        capabilities
            .insert(CapabilityDescriptor::new("Clock").method("now"))
            .unwrap();
        capabilities
            .insert(CapabilityDescriptor::new("PreciseClock").extends("Clock"))
            .unwrap();
        capabilities
    }

    #[test]
    fn test_provider_type_is_contravariant() {
        let caps = capabilities();
        let registry = StaticProviderRegistry::new().with(ExternalService::new("atomic", "PreciseClock"));

        let clock = CapabilityName::from("Clock");
        let provider = registry
            .supply(&caps, &ProviderRequest::new(&clock))
            .unwrap()
            .unwrap();
        assert_eq!(
            provider.origin,
            ProviderOrigin::External {
                service: "atomic".to_string()
            }
        );

        let precise = CapabilityName::from("PreciseClock");
        let registry = StaticProviderRegistry::new().with(ExternalService::new("wall", "Clock"));
        assert!(!registry.can_supply(&caps, &ProviderRequest::new(&precise)));
    }

    #[test]
    fn test_differing_names_never_match() {
        let caps = capabilities();
        let registry = StaticProviderRegistry::new().with(ExternalService::new("utc", "Clock").named("utc"));

        let clock = CapabilityName::from("Clock");
        assert!(!registry.can_supply(&caps, &ProviderRequest::new(&clock).named("local")));
        assert!(registry.can_supply(&caps, &ProviderRequest::new(&clock).named("utc")));
    }

    #[test]
    fn test_exact_name_preferred_over_unnamed() {
        let caps = capabilities();
        let registry = StaticProviderRegistry::new()
            .with(ExternalService::new("default", "Clock"))
            .with(ExternalService::new("utc", "Clock").named("utc"));

        let clock = CapabilityName::from("Clock");
        let provider = registry
            .supply(&caps, &ProviderRequest::new(&clock).named("utc"))
            .unwrap()
            .unwrap();
        assert_eq!(provider.name.as_deref(), Some("utc"));

        let provider = registry
            .supply(&caps, &ProviderRequest::new(&clock))
            .unwrap()
            .unwrap();
        assert_eq!(provider.name, None);
    }

    #[test]
    fn test_two_exact_name_matches_are_ambiguous() {
        let caps = capabilities();
        let registry = StaticProviderRegistry::new()
            .with(ExternalService::new("a", "Clock").named("utc"))
            .with(ExternalService::new("b", "PreciseClock").named("utc"));

        let clock = CapabilityName::from("Clock");
        let err = registry
            .supply(&caps, &ProviderRequest::new(&clock).named("utc"))
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::AmbiguousOrInvalidNameMatch {
                capability: clock.clone(),
                name: "utc".to_string(),
                candidates: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert!(!registry.can_supply(&caps, &ProviderRequest::new(&clock).named("utc")));
    }

    #[test]
    fn test_dependent_restricts_provider() {
        let caps = capabilities();
        let registry = StaticProviderRegistry::new()
            .with(ExternalService::new("audit-clock", "Clock").for_dependent("AuditLog"));

        let clock = CapabilityName::from("Clock");
        let greeter = FragmentName::from("Greeter");
        let audit = FragmentName::from("AuditLog");
        let mut request = ProviderRequest::new(&clock);
        request.dependent = Some(&greeter);
        assert!(!registry.can_supply(&caps, &request));
        request.dependent = Some(&audit);
        assert!(registry.can_supply(&caps, &request));
    }
}

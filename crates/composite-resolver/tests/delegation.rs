//! Wrapped composites: dependency supply and capability delegation

use composite_model::{
    CapabilityDescriptor, CapabilityName, Catalog, CatalogBuilder, CompositeDeclaration,
    DeclareFragment, InterceptorDescriptor, MixinDescriptor,
};
use composite_resolver::{
    BindingOrigin, ProviderOrigin, ResolutionEngine, ResolutionError, ResolverSettings,
};

fn base() -> CatalogBuilder {
    Catalog::builder()
        .capability(CapabilityDescriptor::new("Greeter").method("greet"))
        .capability(CapabilityDescriptor::new("Store").method("load"))
        .mixin(MixinDescriptor::builder("MemoryStore").implements("Store").build().unwrap())
        .mixin(
            MixinDescriptor::builder("StoredGreeter")
                .implements("Greeter")
                .uses("Store")
                .build()
                .unwrap(),
        )
        .interceptor(InterceptorDescriptor::concern("Trace").around_any_invocation().build().unwrap())
}

fn with_inner() -> CatalogBuilder {
    base()
        .composite(
            CompositeDeclaration::new("Inner")
                .exposes("Store")
                .mixin("MemoryStore")
                .interceptor("Trace"),
        )
        .composite(
            CompositeDeclaration::new("Outer")
                .exposes("Greeter")
                .mixin("StoredGreeter")
                .wraps("Inner"),
        )
}

#[test]
fn test_wrapped_composite_supplies_dependency() {
    let engine = ResolutionEngine::new(with_inner().build().unwrap()).unwrap();
    let outer = engine.resolve("Outer").unwrap();

    assert_eq!(outer.wrapped().unwrap().name(), "Inner");
    let slots = outer.dependencies_of("StoredGreeter").unwrap();
    assert_eq!(
        slots[0].provider.as_ref().unwrap().origin,
        ProviderOrigin::Wrapped {
            composite: "Inner".into(),
            mixin: "MemoryStore".into(),
        }
    );

    // Inner was resolved on the way and is served from the cache.
    let inner = engine.resolve("Inner").unwrap();
    assert!(std::sync::Arc::ptr_eq(outer.wrapped().unwrap(), &inner));
    assert_eq!(engine.computations(), 2);
}

/// Outer backs Store itself but wraps a composite that only audits.
fn with_audit_inner() -> CatalogBuilder {
    base()
        .capability(CapabilityDescriptor::new("Audit").method("record"))
        .mixin(MixinDescriptor::builder("AuditLog").implements("Audit").build().unwrap())
        .mixin(MixinDescriptor::builder("PlainGreeter").implements("Greeter").build().unwrap())
        .composite(CompositeDeclaration::new("Auditor").exposes("Audit").mixin("AuditLog"))
}

#[test]
fn test_candidate_skipped_when_wrapped_composite_lacks_dependency() {
    let engine = ResolutionEngine::new(
        with_audit_inner()
            .composite(
                CompositeDeclaration::new("Outer")
                    .exposes("Greeter")
                    .mixin("StoredGreeter")
                    .mixin("PlainGreeter")
                    .mixin("MemoryStore")
                    .wraps("Auditor"),
            )
            .build()
            .unwrap(),
    )
    .unwrap();
    let outer = engine.resolve("Outer").unwrap();

    let greeter = outer.mixin_for(&CapabilityName::from("Greeter")).unwrap();
    assert_eq!(greeter.mixin.name(), "PlainGreeter");
    assert_eq!(greeter.origin, BindingOrigin::Own);
}

#[test]
fn test_interceptor_skipped_when_wrapped_composite_lacks_dependency() {
    let builder = || {
        with_audit_inner()
            .capability(CapabilityDescriptor::new("Meter").method("count"))
            .mixin(MixinDescriptor::builder("Counter").implements("Meter").build().unwrap())
            .interceptor(
                InterceptorDescriptor::concern("Metrics")
                    .around_any_invocation()
                    .uses("Meter")
                    .build()
                    .unwrap(),
            )
    };
    let declaration = CompositeDeclaration::new("Outer")
        .exposes("Greeter")
        .mixin("PlainGreeter")
        .mixin("Counter")
        .interceptor("Metrics");

    // A sibling supplies Meter when nothing is wrapped.
    let plain = ResolutionEngine::new(builder().composite(declaration.clone()).build().unwrap())
        .unwrap()
        .with_settings(ResolverSettings::strict());
    let greet = plain.resolve("Outer").unwrap();
    assert_eq!(greet.method("Greeter", "greet").unwrap().interceptor_names(), vec!["Metrics"]);

    // Wrapping a composite without a meter rules the interceptor out,
    // which is not an error even under strict settings.
    let wrapped = ResolutionEngine::new(
        builder()
            .composite(declaration.wraps("Auditor"))
            .build()
            .unwrap(),
    )
    .unwrap()
    .with_settings(ResolverSettings::strict());
    let greet = wrapped.resolve("Outer").unwrap();
    assert!(greet.method("Greeter", "greet").unwrap().chain.is_empty());
}

#[test]
fn test_missing_wrapped_composite_leaves_dependency_unsatisfied() {
    let engine = ResolutionEngine::new(
        base()
            .composite(
                CompositeDeclaration::new("Outer")
                    .exposes("Greeter")
                    .mixin("StoredGreeter"),
            )
            .build()
            .unwrap(),
    )
    .unwrap();

    let err = engine.resolve("Outer").unwrap_err();
    match err {
        ResolutionError::UnsatisfiableDependency { fragment, slot, .. } => {
            assert_eq!(fragment, "StoredGreeter");
            assert_eq!(slot.capability, "Store");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_capability_without_own_mixin_is_delegated() {
    let engine = ResolutionEngine::new(
        with_inner()
            .composite(
                CompositeDeclaration::new("Facade")
                    .exposes("Greeter")
                    .exposes("Store")
                    .mixin("StoredGreeter")
                    .wraps("Inner"),
            )
            .build()
            .unwrap(),
    )
    .unwrap();
    let facade = engine.resolve("Facade").unwrap();

    let store = facade.mixin_for(&CapabilityName::from("Store")).unwrap();
    assert_eq!(store.mixin.name(), "MemoryStore");
    assert_eq!(store.origin, BindingOrigin::Wrapped("Inner".into()));
    assert!(store.is_delegated());

    // Delegated mixins are not part of this composite's own mixins.
    let used: Vec<&str> = facade.used_mixins().iter().map(|m| m.name().as_str()).collect();
    assert_eq!(used, vec!["StoredGreeter"]);

    // Inner's interceptors stay inside Inner.
    let plan = facade.method("Store", "load").unwrap();
    assert!(plan.chain.is_empty());
    let inner = facade.wrapped().unwrap().method("Store", "load").unwrap();
    assert_eq!(inner.interceptor_names(), vec!["Trace"]);
}

#[test]
fn test_delegation_is_one_level() {
    let engine = ResolutionEngine::new(
        with_inner()
            .composite(
                CompositeDeclaration::new("Facade")
                    .exposes("Greeter")
                    .exposes("Store")
                    .mixin("StoredGreeter")
                    .wraps("Inner"),
            )
            .composite(
                CompositeDeclaration::new("Shell")
                    .exposes("Store")
                    .wraps("Facade"),
            )
            .build()
            .unwrap(),
    )
    .unwrap();

    assert_eq!(
        engine.resolve("Shell").unwrap_err(),
        ResolutionError::UnresolvedCapability {
            composite: "Shell".into(),
            capability: "Store".into(),
        }
    );
}

#[test]
fn test_own_mixin_beats_delegation() {
    let engine = ResolutionEngine::new(
        with_inner()
            .composite(
                CompositeDeclaration::new("Local")
                    .exposes("Store")
                    .mixin("MemoryStore")
                    .wraps("Inner"),
            )
            .build()
            .unwrap(),
    )
    .unwrap();
    let local = engine.resolve("Local").unwrap();
    let store = local.mixin_for(&CapabilityName::from("Store")).unwrap();
    assert_eq!(store.origin, BindingOrigin::Own);
}

#[test]
fn test_elaborate_resolves_wrapped_first() {
    let engine = ResolutionEngine::new(with_inner().build().unwrap()).unwrap();
    let names: Vec<String> = engine
        .elaborate()
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["Inner", "Outer"]);

    let plan = engine.resolve("Outer").unwrap().plan();
    assert_eq!(plan.wraps, Some("Inner".into()));
}

#[test]
fn test_wrap_cycle_rejected_at_construction() {
    let catalog = base()
        .composite(
            CompositeDeclaration::new("A")
                .exposes("Store")
                .mixin("MemoryStore")
                .wraps("B"),
        )
        .composite(
            CompositeDeclaration::new("B")
                .exposes("Store")
                .mixin("MemoryStore")
                .wraps("A"),
        )
        .build()
        .unwrap();

    let err = ResolutionEngine::new(catalog).unwrap_err();
    assert_eq!(
        err,
        ResolutionError::CyclicComposition(vec!["A".into(), "B".into(), "A".into()])
    );
    assert_eq!(err.to_string(), "composites wrap each other in a cycle: A → B → A");
}

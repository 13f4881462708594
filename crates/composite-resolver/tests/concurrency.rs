//! Concurrent callers share one resolution per composite

use composite_model::{
    CapabilityDescriptor, Catalog, CompositeDeclaration, DeclareFragment, MixinDescriptor,
};
use composite_resolver::{ResolutionEngine, ResolutionError};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 16;

fn engine() -> Arc<ResolutionEngine> {
    let catalog = Catalog::builder()
        .capability(CapabilityDescriptor::new("Greeter").method("greet"))
        .capability(CapabilityDescriptor::new("Store").method("load"))
        .mixin(MixinDescriptor::builder("GreeterImpl").implements("Greeter").build().unwrap())
        .mixin(MixinDescriptor::builder("MemoryStore").implements("Store").build().unwrap())
        .composite(CompositeDeclaration::new("Inner").exposes("Store").mixin("MemoryStore"))
        .composite(
            CompositeDeclaration::new("App")
                .exposes("Greeter")
                .mixin("GreeterImpl")
                .wraps("Inner"),
        )
        .composite(CompositeDeclaration::new("Broken").exposes("Greeter"))
        .build()
        .unwrap();
    Arc::new(ResolutionEngine::new(catalog).unwrap())
}

fn race<T: Send + 'static>(
    engine: &Arc<ResolutionEngine>,
    f: impl Fn(&ResolutionEngine) -> T + Clone + Send + 'static,
) -> Vec<T> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(engine);
            let barrier = Arc::clone(&barrier);
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f(&*engine)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_resolution_shares_one_result() {
    let engine = engine();
    let results = race(&engine, |engine| engine.resolve("App").unwrap());

    let first = &results[0];
    assert!(results.iter().all(|r| Arc::ptr_eq(r, first)));
    // App and the Inner composite it wraps.
    assert_eq!(engine.computations(), 2);
}

#[test]
fn test_concurrent_failures_are_shared() {
    let engine = engine();
    let results = race(&engine, |engine| engine.resolve("Broken"));

    let expected = ResolutionError::UnresolvedCapability {
        composite: "Broken".into(),
        capability: "Greeter".into(),
    };
    assert!(results.iter().all(|r| r.as_ref().unwrap_err() == &expected));
    assert_eq!(engine.computations(), 1);
}

#[test]
fn test_mixed_requests_compute_each_composite_once() {
    let engine = engine();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let counter = Arc::new(counter);
    let seen = Arc::clone(&counter);

    race(&engine, move |engine| {
        let n = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let name = ["App", "Inner", "Broken"][n % 3];
        let _ = engine.resolve(name);
    });

    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), THREADS);
    assert_eq!(engine.computations(), 3);
}

#[test]
fn test_unknown_composite_is_not_cached() {
    let engine = engine();
    assert_eq!(
        engine.resolve("Missing").unwrap_err(),
        ResolutionError::UnknownComposite("Missing".into())
    );
    assert_eq!(engine.computations(), 0);
}

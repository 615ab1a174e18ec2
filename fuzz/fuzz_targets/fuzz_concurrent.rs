#![no_main]

//! Fuzz target for concurrent container operations
//!
//! Threads register, resolve and open scopes against one container while
//! singletons must still be constructed exactly once.

use arbitrary::Arbitrary;
use ioc_graph::{Container, DependencySite, Instance, ServiceType, TypeCatalog, TypeDescriptor, instance};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    ResolveShared,
    ResolveConsumer,
    ResolveAll,
    RegisterConsumer,
    ScopedResolve,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    /// Number of threads (clamped to 1-8)
    thread_count: u8,
    ops_per_thread: Vec<ThreadOp>,
}

fn ty(name: &str) -> ServiceType {
    ServiceType::named(name)
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let created = Arc::new(AtomicUsize::new(0));
    let catalog = TypeCatalog::new();
    {
        let created = Arc::clone(&created);
        catalog
            .describe(TypeDescriptor::new("Shared").constructor([], move |_: &ServiceType, _: Vec<Instance>| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(instance(()))
            }))
            .describe(TypeDescriptor::new("Consumer").constructor(
                [DependencySite::param("shared", ty("Shared"))],
                |_: &ServiceType, args: Vec<Instance>| Ok(instance(args)),
            ));
    }

    let container = Container::with_introspector(Arc::new(catalog));
    container.register_singleton(ty("Shared"), ty("Shared")).unwrap();

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;

    std::thread::scope(|s| {
        for _ in 0..thread_count {
            let ops = ops.clone();
            let container = &container;
            s.spawn(move || {
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::ResolveShared => {
                            container.resolve(&ty("Shared")).unwrap();
                        }
                        ThreadOp::ResolveConsumer => {
                            let _ = container.try_resolve(&ty("Consumer")).unwrap();
                        }
                        ThreadOp::ResolveAll => {
                            let all = container.resolve_all(&ty("Consumer")).unwrap();
                            assert!(all.len() <= 1);
                        }
                        ThreadOp::RegisterConsumer => {
                            // concurrent duplicates are skipped
                            container.register(ty("Consumer"), ty("Consumer")).unwrap();
                        }
                        ThreadOp::ScopedResolve => {
                            let scope = container.begin_scope().unwrap();
                            let _ = scope.try_resolve(&ty("Consumer")).unwrap();
                            scope.dispose();
                        }
                    }
                }
            });
        }
    });

    // Container should still be functional
    assert!(container.resolve(&ty("Shared")).is_ok());
    assert_eq!(created.load(Ordering::SeqCst), 1);
});

#![no_main]

//! Fuzz target for planning over arbitrary dependency graphs
//!
//! Builds a catalog of up to eight types with arbitrary constructor edges
//! (cycles included), registers an arbitrary subset and runs arbitrary
//! operations. Validation must agree with resolution.

use arbitrary::Arbitrary;
use ioc_graph::{
    Container, DependencySite, ErrorKind, Instance, Lifetime, RegistrationOptions, ResolutionScope, ServiceType,
    TypeCatalog, TypeDescriptor, instance,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const MAX_NODES: usize = 8;

#[derive(Debug, Arbitrary)]
struct Node {
    /// Constructor parameters, as indexes into the node list
    edges: Vec<u8>,
    /// Second, smaller constructor
    fallback: bool,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Register { node: u8, lifetime: u8, named: bool },
    Remap { node: u8 },
    Resolve(u8),
    TryResolve(u8),
    ResolveAll(u8),
    CanResolve(u8),
    BeginScope,
    EndScope,
    Validate,
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    nodes: Vec<Node>,
    ops: Vec<Op>,
}

fn node_type(index: usize) -> ServiceType {
    ServiceType::named(format!("N{index}"))
}

fn catalog(nodes: &[Node]) -> TypeCatalog {
    let catalog = TypeCatalog::new();
    for (index, node) in nodes.iter().enumerate() {
        let sites: Vec<DependencySite> = node
            .edges
            .iter()
            .take(4)
            .enumerate()
            .map(|(i, edge)| DependencySite::param(format!("p{i}"), node_type(*edge as usize % nodes.len())))
            .collect();
        let first = sites.first().cloned();

        let mut descriptor = TypeDescriptor::new(format!("N{index}"))
            .constructor(sites, |_: &ServiceType, args: Vec<Instance>| Ok(instance(args)));
        if node.fallback {
            descriptor = descriptor.constructor(first, |_: &ServiceType, args: Vec<Instance>| Ok(instance(args)));
        }
        catalog.describe(descriptor);
    }
    catalog
}

fn lifetime(selector: u8) -> Lifetime {
    match selector % 3 {
        0 => Lifetime::Transient,
        1 => Lifetime::Scoped,
        _ => Lifetime::Singleton,
    }
}

fuzz_target!(|scenario: Scenario| {
    let nodes: Vec<Node> = scenario.nodes.into_iter().take(MAX_NODES).collect();
    if nodes.is_empty() {
        return;
    }
    let pick = |n: u8| node_type(n as usize % nodes.len());

    let container = Container::with_introspector(Arc::new(catalog(&nodes)));
    let mut scopes: Vec<ResolutionScope> = Vec::new();

    for op in scenario.ops.into_iter().take(64) {
        let scope: &ResolutionScope = scopes.last().unwrap_or(&container);
        match op {
            Op::Register { node, lifetime: selector, named } => {
                let mut options = RegistrationOptions::new().with_lifetime(lifetime(selector));
                if named {
                    options = options.named("named");
                }
                let ty = pick(node);
                container.register_type(ty.clone(), ty, options).unwrap();
            }
            Op::Remap { node } => {
                let ty = pick(node);
                container.remap(ty.clone(), ty, RegistrationOptions::new()).unwrap();
            }
            Op::Resolve(node) => {
                if let Err(err) = scope.resolve(&pick(node)) {
                    assert_ne!(err.kind(), ErrorKind::Disposed);
                }
            }
            Op::TryResolve(node) => {
                if let Err(err) = scope.try_resolve(&pick(node)) {
                    assert_eq!(err.kind(), ErrorKind::CircularDependency);
                }
            }
            Op::ResolveAll(node) => {
                let _ = scope.resolve_all(&pick(node));
            }
            Op::CanResolve(node) => {
                let ty = pick(node);
                if scope.can_resolve(&ty, None).unwrap() {
                    assert!(scope.resolve(&ty).is_ok());
                }
            }
            Op::BeginScope => {
                if scopes.len() < 4 {
                    let child = scope.begin_scope().unwrap();
                    scopes.push(child);
                }
            }
            Op::EndScope => {
                if let Some(scope) = scopes.pop() {
                    scope.dispose();
                    assert_eq!(scope.resolve(&pick(0)).unwrap_err().kind(), ErrorKind::Disposed);
                }
            }
            Op::Validate => {
                if container.validate().is_ok() {
                    for (service_type, _) in container.registration_mappings() {
                        assert!(container.resolve(&service_type).is_ok());
                    }
                }
            }
        }
    }
});

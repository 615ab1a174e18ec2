//! Plan compilation and factory caches
//!
//! [`compile`] turns a [`Plan`] into a tree of closures that does no
//! matching on the plan at run time. Compiled factories are cached per
//! scope in a [`FactoryCache`], tagged with the container version they were
//! planned against; a version mismatch is simply a miss.
//!
//! This module also hosts the runtime values produced by the deferred
//! shapes: [`Deferred`] for `Lazy<T>` and [`FactoryFn`] for `Func<.., T>`.

use crate::plan::{Frame, Plan, PlanNode, Wiring};
use crate::scope::WeakScope;
use crate::tree::{ImmutableTree, Swap};
use crate::{DiError, Injectable, Instance, Result, ServiceTuple, ServiceType, downcast, instance};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A compiled construction closure.
pub(crate) type Compiled = Arc<dyn Fn(&Frame<'_>) -> Result<Instance> + Send + Sync>;

// =============================================================================
// Compilation
// =============================================================================

/// Compile a plan into a closure tree.
pub(crate) fn compile(plan: &Plan) -> Compiled {
    match plan.node() {
        PlanNode::Constant(value) => {
            let value = Arc::clone(value);
            Arc::new(move |_: &Frame<'_>| -> Result<Instance> { Ok(Arc::clone(&value)) })
        }
        PlanNode::Argument { .. } => {
            // argument lookups are trivial; reuse the interpreter
            let plan = plan.clone();
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> { plan.evaluate(frame) })
        }
        PlanNode::Construct(construct) => {
            let implementation = construct.implementation.clone();
            let activator = Arc::clone(&construct.activator);
            let arguments = compile_all(&construct.arguments);
            let wiring = CompiledWiring::new(&construct.wiring);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                let values = invoke_all(&arguments, frame)?;
                let instance = activator(&implementation, values)?;
                wiring.apply(&instance, frame)?;
                Ok(instance)
            })
        }
        PlanNode::Factory { delegate, .. } => {
            let delegate = Arc::clone(delegate);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> { delegate(frame.scope) })
        }
        PlanNode::BuildUp { target, wiring } => {
            let target = compile(target);
            let wiring = CompiledWiring::new(wiring);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                let instance = target(frame)?;
                wiring.apply(&instance, frame)?;
                Ok(instance)
            })
        }
        PlanNode::Initialize { inner, initializer } => {
            let inner = compile(inner);
            let initializer = Arc::clone(initializer);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                let instance = inner(frame)?;
                initializer(&instance, frame.scope)?;
                Ok(instance)
            })
        }
        PlanNode::Tracked { inner, disposer } => {
            let inner = compile(inner);
            let disposer = Arc::clone(disposer);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                let instance = inner(frame)?;
                frame.scope.track(&instance, &disposer);
                Ok(instance)
            })
        }
        PlanNode::Cached {
            key,
            lifetime,
            inner,
            disposer,
        } => {
            let inner = compile(inner);
            let (key, lifetime, disposer) = (key.clone(), lifetime.clone(), disposer.clone());
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                crate::lifetime::resolve_cached(frame, &key, &lifetime, disposer.as_ref(), |owned| inner(owned))
            })
        }
        PlanNode::Collection(items) => {
            let items = compile_all(items);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> { Ok(instance(invoke_all(&items, frame)?)) })
        }
        PlanNode::Tuple(items) => {
            let items = compile_all(items);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                Ok(instance(ServiceTuple(invoke_all(&items, frame)?)))
            })
        }
        PlanNode::Deferred(body) => {
            let body = compile(body);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                Ok(instance(Deferred::new(frame, Arc::clone(&body))))
            })
        }
        PlanNode::Func {
            service_type,
            arity,
            body,
        } => {
            let body = compile(body);
            let (service_type, arity) = (service_type.clone(), *arity);
            Arc::new(move |frame: &Frame<'_>| -> Result<Instance> {
                Ok(instance(FactoryFn::new(
                    frame,
                    service_type.clone(),
                    arity,
                    Arc::clone(&body),
                )))
            })
        }
    }
}

fn compile_all(plans: &[Plan]) -> Vec<Compiled> {
    plans.iter().map(compile).collect()
}

fn invoke_all(compiled: &[Compiled], frame: &Frame<'_>) -> Result<Vec<Instance>> {
    compiled.iter().map(|f| f(frame)).collect()
}

struct CompiledWiring {
    members: Vec<(crate::introspect::MemberSetter, Compiled)>,
    methods: Vec<(crate::introspect::MethodInvoker, Vec<Compiled>)>,
}

impl CompiledWiring {
    fn new(wiring: &Wiring) -> Self {
        Self {
            members: wiring
                .members
                .iter()
                .map(|(setter, plan)| (Arc::clone(setter), compile(plan)))
                .collect(),
            methods: wiring
                .methods
                .iter()
                .map(|(invoker, parameters)| (Arc::clone(invoker), compile_all(parameters)))
                .collect(),
        }
    }

    fn apply(&self, instance: &Instance, frame: &Frame<'_>) -> Result<()> {
        for (setter, value) in &self.members {
            setter(instance, value(frame)?)?;
        }
        for (invoker, parameters) in &self.methods {
            invoker(instance, invoke_all(parameters, frame)?)?;
        }
        Ok(())
    }
}

// =============================================================================
// Factory cache
// =============================================================================

/// What a cached factory answers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum CacheKey {
    Service {
        ty: ServiceType,
        name: Option<Arc<str>>,
    },
    All(ServiceType),
    Func {
        ty: ServiceType,
        name: Option<Arc<str>>,
        parameters: Vec<ServiceType>,
    },
}

#[derive(Clone, Default)]
struct CacheSnapshot {
    version: u64,
    entries: ImmutableTree<CacheKey, Compiled>,
}

/// Per-scope cache of compiled factories.
pub(crate) struct FactoryCache {
    snapshot: Swap<CacheSnapshot>,
}

impl FactoryCache {
    pub fn new() -> Self {
        Self {
            snapshot: Swap::new(CacheSnapshot::default()),
        }
    }

    /// Cached factory planned against `version`, if any.
    pub fn get(&self, key: &CacheKey, version: u64) -> Option<Compiled> {
        let snapshot = self.snapshot.load();
        if snapshot.version != version {
            return None;
        }
        let hit = snapshot.entries.get(key).cloned();

        #[cfg(feature = "logging")]
        if hit.is_some() {
            trace!(target: "ioc_graph", ?key, "Factory cache hit");
        }

        hit
    }

    /// Publish a factory planned against `version`.
    ///
    /// A snapshot of an older version is discarded; a newer one is left
    /// alone since the factory is already stale.
    pub fn publish(&self, key: CacheKey, version: u64, factory: Compiled) {
        let published = self.snapshot.update(|snapshot| {
            if snapshot.version > version {
                return None;
            }
            let entries = if snapshot.version == version {
                snapshot.entries.insert(key.clone(), Arc::clone(&factory))
            } else {
                ImmutableTree::empty().insert(key.clone(), Arc::clone(&factory))
            };
            Some((CacheSnapshot { version, entries }, ()))
        });

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            ?key,
            version,
            published = published.is_some(),
            "Factory cache publish"
        );
        #[cfg(not(feature = "logging"))]
        let _ = published;
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }
}

// =============================================================================
// Runtime values
// =============================================================================

/// Value of a `Lazy<T>` dependency: built on first access, then reused.
///
/// Holds its scope weakly; access fails with `Disposed` once the scope is
/// gone.
pub struct Deferred {
    scope: WeakScope,
    arguments: Vec<Arc<[Instance]>>,
    body: Compiled,
    value: OnceCell<Instance>,
}

impl Deferred {
    pub(crate) fn new(frame: &Frame<'_>, body: Compiled) -> Self {
        Self {
            scope: frame.scope.downgrade(),
            arguments: frame.arguments.to_vec(),
            body,
            value: OnceCell::new(),
        }
    }

    /// The underlying instance, built now if this is the first access.
    pub fn value(&self) -> Result<Instance> {
        self.value
            .get_or_try_init(|| {
                let scope = self.scope.upgrade()?;
                scope.ensure_alive()?;
                (self.body)(&Frame {
                    scope: &scope,
                    arguments: &self.arguments,
                })
            })
            .cloned()
    }

    /// Typed access to [`Deferred::value`].
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        downcast(self.value()?, &ServiceType::of::<T>())
    }

    pub fn is_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("created", &self.is_created()).finish()
    }
}

/// Value of a `Func<P.., T>` dependency or of `resolve_factory`.
///
/// Like [`Deferred`], holds its scope weakly.
pub struct FactoryFn {
    scope: WeakScope,
    arguments: Vec<Arc<[Instance]>>,
    service_type: ServiceType,
    arity: usize,
    body: Compiled,
}

impl FactoryFn {
    pub(crate) fn new(frame: &Frame<'_>, service_type: ServiceType, arity: usize, body: Compiled) -> Self {
        Self {
            scope: frame.scope.downgrade(),
            arguments: frame.arguments.to_vec(),
            service_type,
            arity,
            body,
        }
    }

    /// Build an instance with `args` bound to the factory's parameters.
    pub fn call(&self, args: Vec<Instance>) -> Result<Instance> {
        if args.len() != self.arity {
            return Err(DiError::InvalidArguments {
                service_type: self.service_type.to_string(),
                expected: self.arity,
                actual: args.len(),
            });
        }
        let scope = self.scope.upgrade()?;
        scope.ensure_alive()?;

        let mut arguments = self.arguments.clone();
        arguments.push(args.into());
        (self.body)(&Frame {
            scope: &scope,
            arguments: &arguments,
        })
    }

    /// Typed access to [`FactoryFn::call`].
    pub fn call_as<T: Injectable>(&self, args: Vec<Instance>) -> Result<Arc<T>> {
        downcast(self.call(args)?, &ServiceType::of::<T>())
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The `Func<..>` shape this factory was built for.
    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }
}

impl fmt::Debug for FactoryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryFn")
            .field("service_type", &self.service_type)
            .field("arity", &self.arity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ResolutionScope;
    use crate::Container;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Plan {
        let counter = Arc::clone(counter);
        Plan::from_factory(
            ServiceType::named("Counted"),
            Arc::new(move |_: &ResolutionScope| -> Result<Instance> { Ok(instance(counter.fetch_add(1, Ordering::SeqCst))) }),
        )
    }

    #[test]
    fn test_cache_version_mismatch_is_a_miss() {
        let cache = FactoryCache::new();
        let key = CacheKey::Service {
            ty: ServiceType::named("IService"),
            name: None,
        };
        let factory = compile(&Plan::constant(instance(1u8)));

        cache.publish(key.clone(), 3, Arc::clone(&factory));
        assert!(cache.get(&key, 3).is_some());
        assert!(cache.get(&key, 4).is_none());

        // stale publish against an older version is dropped
        cache.publish(key.clone(), 2, Arc::clone(&factory));
        assert!(cache.get(&key, 3).is_some());

        // newer version starts a fresh snapshot
        cache.publish(CacheKey::All(ServiceType::named("IService")), 5, factory);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key, 5).is_none());
    }

    #[test]
    fn test_concurrent_publishes_keep_every_entry() {
        let cache = FactoryCache::new();
        let factory = compile(&Plan::constant(instance(())));

        std::thread::scope(|s| {
            for t in 0..4 {
                let (cache, factory) = (&cache, &factory);
                s.spawn(move || {
                    for i in 0..50 {
                        let key = CacheKey::Service {
                            ty: ServiceType::named(format!("S{t}_{i}")),
                            name: None,
                        };
                        cache.publish(key, 1, Arc::clone(factory));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 200);
    }

    #[test]
    fn test_deferred_builds_once() {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let compiled = compile(&Plan::deferred(counting(&counter)));

        let value = compiled(&Frame::new(&container)).unwrap();
        let deferred = downcast::<Deferred>(value, &ServiceType::named("Lazy")).unwrap();
        assert!(!deferred.is_created());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let first = deferred.value().unwrap();
        let second = deferred.value().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compiled_matches_evaluated() {
        let container = Container::new();
        let frame = Frame::new(&container);
        let plan = Plan::collection(vec![
            Plan::constant(instance(1u32)),
            Plan::tuple(vec![Plan::constant(instance(2u32))]),
        ]);

        let compiled = compile(&plan)(&frame).unwrap();
        let evaluated = plan.evaluate(&frame).unwrap();
        let ty = ServiceType::named("Vec");
        assert_eq!(
            downcast::<Vec<Instance>>(compiled, &ty).unwrap().len(),
            downcast::<Vec<Instance>>(evaluated, &ty).unwrap().len()
        );
    }
}

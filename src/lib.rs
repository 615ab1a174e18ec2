//! # ioc-graph - Object-Graph Resolution Engine
//!
//! A dependency-injection engine that turns registrations of services to
//! implementations into fully wired object graphs.
//!
//! ## Features
//!
//! - **Lock-free stores** - registrations live in persistent AVL trees published by compare-and-swap
//! - **Planned, then compiled** - each request is planned once into an IR, compiled to a closure and cached per scope
//! - **Scope-correct lifetimes** - transient, scoped, singleton and named-scope instances
//! - **Cycle detection** - per-request visited tracking, no global state
//! - **Open generics** - `IRepository<T>` registrations are closed per request and checked against constraints
//! - **Dependency shapes** - `Enumerable<T>`, `Lazy<T>`, `Func<.., T>` and `Tuple<..>` without registration
//! - **Decorators** - wrap every resolution of a service, innermost-first
//! - **Observable** - optional `tracing` events with JSON or pretty output
//!
//! The engine never looks at Rust types itself: a [`TypeIntrospector`]
//! (by default the in-memory [`TypeCatalog`]) describes constructors,
//! members and contracts.
//!
//! ## Quick Start
//!
//! ```rust
//! use ioc_graph::{Container, DependencySite, ServiceType, TypeCatalog, TypeDescriptor, instance};
//! use std::sync::Arc;
//!
//! struct ConsoleLogger;
//! struct Greeter {
//!     logger: ioc_graph::Instance,
//! }
//!
//! let logger = ServiceType::named("ILogger");
//! let catalog = TypeCatalog::new();
//! catalog
//!     .describe(TypeDescriptor::interface("ILogger"))
//!     .describe(
//!         TypeDescriptor::new("ConsoleLogger")
//!             .implements(logger.clone())
//!             .constructor([], |_, _| Ok(instance(ConsoleLogger))),
//!     )
//!     .describe(TypeDescriptor::new("Greeter").constructor(
//!         [DependencySite::param("logger", logger.clone())],
//!         |_, mut args| Ok(instance(Greeter { logger: args.remove(0) })),
//!     ));
//!
//! let container = Container::with_introspector(Arc::new(catalog));
//! container.register_singleton(logger.clone(), ServiceType::named("ConsoleLogger")).unwrap();
//! container.register(ServiceType::named("Greeter"), ServiceType::named("Greeter")).unwrap();
//!
//! let greeter = container.resolve_as::<Greeter>(&ServiceType::named("Greeter")).unwrap();
//! assert!(greeter.logger.downcast_ref::<ConsoleLogger>().is_some());
//! assert!(container.validate().is_ok());
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use ioc_graph::{Container, ServiceType, instance};
//!
//! let container = Container::new();
//! let request = container.begin_named_scope("request").unwrap();
//!
//! let id = ServiceType::named("RequestId");
//! request.put_instance_in_scope(&id, instance(42u64)).unwrap();
//! assert_eq!(*request.resolve_as::<u64>(&id).unwrap(), 42);
//! assert!(container.try_resolve(&id).unwrap().is_none());
//!
//! request.dispose();
//! assert!(request.resolve(&id).is_err());
//! ```

mod config;
mod container;
mod context;
mod error;
mod factory;
mod instance;
mod introspect;
mod lifetime;
#[cfg(feature = "logging")]
pub mod logging;
mod plan;
mod planner;
mod registration;
mod scope;
mod store;
mod tree;
mod types;
mod validate;

pub use config::{ConstructorComparator, ConstructorSelectionRule, ContainerConfiguration, RegistrationBehavior};
pub use container::Container;
pub use context::{DependencyOverride, ResolutionContext, ResolveRequest};
pub use error::{DiError, ErrorKind, Result};
pub use factory::{Deferred, FactoryFn};
pub use instance::{Disposable, Disposer, Injectable, Instance, ServiceTuple, disposer_for, downcast, instance};
pub use introspect::{
    Activator, ConstraintKind, ConstructorInfo, DependencySite, GenericConstraint, MemberInfo, MemberInjectionRule,
    MemberSetter, MemberVisibility, MethodInfo, MethodInvoker, TypeCatalog, TypeDescriptor, TypeIntrospector,
};
pub use lifetime::Lifetime;
pub use plan::Plan;
pub use planner::DependencyResolver;
pub use registration::{
    Condition, FactoryDelegate, ImplementationSource, Initializer, RegistrationId, RegistrationOptions,
    ServiceRegistration,
};
pub use scope::ResolutionScope;
pub use types::{ServiceType, well_known};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Container, ContainerConfiguration, DependencyOverride, DependencySite, DiError, Instance, Lifetime,
        RegistrationOptions, ResolutionScope, Result, ServiceType, TypeCatalog, TypeDescriptor, downcast, instance,
    };
    pub use std::sync::Arc;
}

/// Fixture types shared by the unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        ConstraintKind, Container, DependencySite, Disposable, Instance, MemberInfo, MemberVisibility, MethodInfo,
        Result, ServiceType, TypeCatalog, TypeDescriptor, instance,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub fn service(name: &str) -> ServiceType {
        ServiceType::named(name)
    }

    /// What every fixture activator builds: its closed type name plus
    /// whatever was injected into it.
    pub struct Component {
        pub kind: String,
        pub dependencies: Vec<Instance>,
        pub members: Mutex<Vec<Instance>>,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl Component {
        pub fn leaf(kind: impl Into<String>) -> Self {
            Self {
                kind: kind.into(),
                dependencies: Vec::new(),
                members: Mutex::new(Vec::new()),
                log: None,
            }
        }
    }

    impl Disposable for Component {
        fn dispose(&self) {
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.kind.clone());
            }
        }
    }

    pub struct Fixture {
        /// Activator invocations
        pub created: Arc<AtomicUsize>,
        /// Kinds of disposed components, in disposal order
        pub disposed: Arc<Mutex<Vec<String>>>,
    }

    pub fn component(value: &Instance) -> &Component {
        value.downcast_ref::<Component>().expect("fixture instance is a Component")
    }

    pub fn kind_of(value: &Instance) -> String {
        component(value).kind.clone()
    }

    pub fn dependency_kinds(value: &Instance) -> Vec<String> {
        component(value).dependencies.iter().map(kind_of).collect()
    }

    pub fn member_kinds(value: &Instance) -> Vec<String> {
        component(value).members.lock().unwrap().iter().map(kind_of).collect()
    }

    fn none() -> [DependencySite; 0] {
        []
    }

    fn param(name: &str, ty: &str) -> DependencySite {
        DependencySite::param(name, service(ty))
    }

    fn set_member(target: &Instance, value: Instance) -> Result<()> {
        component(target).members.lock().unwrap().push(value);
        Ok(())
    }

    fn invoke_method(target: &Instance, args: Vec<Instance>) -> Result<()> {
        component(target).members.lock().unwrap().extend(args);
        Ok(())
    }

    fn catalog(created: &Arc<AtomicUsize>, disposed: &Arc<Mutex<Vec<String>>>) -> TypeCatalog {
        let activate = {
            let created = Arc::clone(created);
            let log = Arc::clone(disposed);
            move |ty: &ServiceType, args: Vec<Instance>| -> Result<Instance> {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(instance(Component {
                    kind: ty.to_string(),
                    dependencies: args,
                    members: Mutex::new(Vec::new()),
                    log: Some(Arc::clone(&log)),
                }))
            }
        };
        let logger = service("ILogger");
        let repository = |arg: ServiceType| ServiceType::generic("IRepository", [arg]);

        let catalog = TypeCatalog::new();
        catalog
            .describe(TypeDescriptor::interface("ILogger"))
            .describe(TypeDescriptor::interface("IClock"))
            .describe(TypeDescriptor::generic("IRepository", 1).abstract_type())
            .describe(
                TypeDescriptor::new("ConsoleLogger")
                    .implements(logger.clone())
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::new("FileLogger")
                    .implements(logger.clone())
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::new("LoggerDecorator")
                    .implements(logger.clone())
                    .constructor([param("inner", "ILogger")], activate.clone()),
            )
            .describe(
                TypeDescriptor::new("SystemClock")
                    .implements(service("IClock"))
                    .constructor(none(), activate.clone()),
            )
            .describe(TypeDescriptor::new("Greeter").constructor([param("logger", "ILogger")], activate.clone()))
            .describe(TypeDescriptor::new("AuditService").constructor([param("audit", "ILogger")], activate.clone()))
            .describe(TypeDescriptor::new("Outer").constructor([param("greeter", "Greeter")], activate.clone()))
            .describe(
                TypeDescriptor::new("Reporter")
                    .constructor([param("logger", "ILogger")], activate.clone())
                    .constructor([param("logger", "ILogger"), param("clock", "IClock")], activate.clone()),
            )
            .describe(
                TypeDescriptor::new("Notifier")
                    .constructor(none(), activate.clone())
                    .member(MemberInfo::new(
                        param("logger", "ILogger"),
                        MemberVisibility::PublicSetter,
                        set_member,
                    ))
                    .member(MemberInfo::new(param("clock", "IClock"), MemberVisibility::PrivateField, set_member).annotated()),
            )
            .describe(
                TypeDescriptor::new("Mailer")
                    .constructor(none(), activate.clone())
                    .method(MethodInfo::new("init", [param("clock", "IClock")], invoke_method)),
            )
            .describe(TypeDescriptor::new("CycleA").constructor([param("b", "CycleB")], activate.clone()))
            .describe(TypeDescriptor::new("CycleB").constructor([param("a", "CycleA")], activate.clone()))
            .describe(TypeDescriptor::new("Ring1").constructor([param("next", "Ring2")], activate.clone()))
            .describe(TypeDescriptor::new("Ring2").constructor([param("next", "Ring3")], activate.clone()))
            .describe(TypeDescriptor::new("Ring3").constructor([param("next", "Ring1")], activate.clone()))
            .describe(TypeDescriptor::new("Deferrer").constructor(
                [DependencySite::param("tail", ServiceType::lazy(service("DeferredTail")))],
                activate.clone(),
            ))
            .describe(TypeDescriptor::new("DeferredTail").constructor([param("head", "Deferrer")], activate.clone()))
            .describe(TypeDescriptor::new("Spawner").constructor(
                [DependencySite::param("spawn", ServiceType::func(None, service("Spawner")))],
                activate.clone(),
            ))
            .describe(
                TypeDescriptor::new("AuditingLogger")
                    .implements(logger.clone())
                    .constructor([param("inner", "ILogger"), param("greeter", "Greeter")], activate.clone()),
            )
            .describe(TypeDescriptor::new("LazyGreeter").constructor(
                [DependencySite::param("logger", ServiceType::lazy(logger.clone()))],
                activate.clone(),
            ))
            .describe(TypeDescriptor::new("User").constructor(none(), activate.clone()))
            .describe(
                TypeDescriptor::new("Point")
                    .value_type()
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::generic("SqlRepository", 1)
                    .implements(repository(ServiceType::param(0)))
                    .constraint(0, ConstraintKind::ReferenceType)
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::new("UserRepository")
                    .implements(repository(service("User")))
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::generic("LoggingRepository", 1)
                    .implements(repository(ServiceType::param(0)))
                    .constructor(
                        [DependencySite::param("inner", repository(ServiceType::param(0)))],
                        activate.clone(),
                    ),
            )
            .describe(
                TypeDescriptor::new("Connection")
                    .disposable::<Component>()
                    .constructor(none(), activate.clone()),
            )
            .describe(
                TypeDescriptor::new("Session")
                    .disposable::<Component>()
                    .constructor([param("conn", "Connection")], activate.clone()),
            )
            .describe(TypeDescriptor::new("Paginator").constructor(
                [param("size", "PageSize").with_default(instance(Component::leaf("DefaultPageSize")))],
                activate,
            ));
        catalog
    }

    pub fn fixture() -> (Container, Fixture) {
        let created = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let container = Container::with_introspector(Arc::new(catalog(&created, &disposed)));
        (container, Fixture { created, disposed })
    }

    pub fn fixture_container() -> Container {
        fixture().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, Component, fixture, fixture_container, service};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_singular_and_collection_resolution() {
        let container = fixture_container();
        let logger = service("ILogger");
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container
            .register_type(logger.clone(), service("FileLogger"), RegistrationOptions::new().named("file"))
            .unwrap();
        container.register(logger.clone(), service("FileLogger")).unwrap();

        // unnamed requests consider named registrations too
        let resolved = container.resolve(&logger).unwrap();
        assert_eq!(test_support::kind_of(&resolved), "FileLogger");
        assert_eq!(container.registration_mappings().len(), 3);

        let all = container.resolve_all(&logger).unwrap();
        let kinds: Vec<_> = all.iter().map(test_support::kind_of).collect();
        assert_eq!(kinds, vec!["ConsoleLogger", "FileLogger", "FileLogger"]);

        assert!(container.is_registered(&logger, Some("file")));
        assert!(!container.is_registered(&logger, Some("console")));
    }

    #[test]
    fn test_unregistered_type() {
        let container = fixture_container();
        let missing = service("Missing");

        let err = container.resolve(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
        assert!(container.try_resolve(&missing).unwrap().is_none());
        assert!(!container.can_resolve(&missing, None).unwrap());
    }

    #[test]
    fn test_cycles_fail_in_resolution_and_validation() {
        let (container, fixture) = fixture();
        container.register(service("CycleA"), service("CycleA")).unwrap();
        container.register(service("CycleB"), service("CycleB")).unwrap();
        container.register(service("Outer"), service("Outer")).unwrap();

        let err = container.resolve(&service("CycleA")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        assert!(
            container
                .validate()
                .unwrap_err()
                .iter()
                .any(|e| e.kind() == ErrorKind::CircularDependency)
        );
        assert_eq!(fixture.created.load(Ordering::SeqCst), 0);
    }

    fn assert_cycle(container: &Container, root: &str) {
        let err = container.resolve(&service(root)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency, "{root}: {err}");
        let errors = container.validate().unwrap_err();
        assert!(
            errors.iter().all(|e| e.kind() == ErrorKind::CircularDependency),
            "{root}: {errors:?}"
        );
    }

    #[test]
    fn test_longer_cycles_are_detected() {
        let (container, fixture) = fixture();
        for ring in ["Ring1", "Ring2", "Ring3"] {
            container.register(service(ring), service(ring)).unwrap();
        }
        assert_cycle(&container, "Ring1");
        assert_eq!(container.validate().unwrap_err().len(), 3);
        assert_eq!(fixture.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cycles_through_lazy_and_func_are_detected() {
        let container = fixture_container();
        container.register(service("Deferrer"), service("Deferrer")).unwrap();
        container.register(service("DeferredTail"), service("DeferredTail")).unwrap();
        assert_cycle(&container, "Deferrer");

        let container = fixture_container();
        container.register(service("Spawner"), service("Spawner")).unwrap();
        assert_cycle(&container, "Spawner");
    }

    #[test]
    fn test_cycles_through_decorator_dependencies_are_detected() {
        let container = fixture_container();
        container.register(service("ILogger"), service("ConsoleLogger")).unwrap();
        container.register(service("Greeter"), service("Greeter")).unwrap();
        container
            .register_decorator(service("ILogger"), service("AuditingLogger"), RegistrationOptions::new())
            .unwrap();
        assert_cycle(&container, "Greeter");
        assert_eq!(
            container.resolve(&service("ILogger")).unwrap_err().kind(),
            ErrorKind::CircularDependency
        );
    }

    #[test]
    fn test_cached_lazy_does_not_keep_its_scope_alive() {
        let container = fixture_container();
        container.register(service("ILogger"), service("ConsoleLogger")).unwrap();
        container
            .register_type(service("LazyGreeter"), service("LazyGreeter"), RegistrationOptions::new().scoped())
            .unwrap();

        let scope = container.begin_scope().unwrap();
        let greeter = scope.resolve(&service("LazyGreeter")).unwrap();
        let lazy = ServiceType::lazy(service("ILogger"));
        let deferred = downcast::<Deferred>(test_support::component(&greeter).dependencies[0].clone(), &lazy).unwrap();
        assert_eq!(test_support::kind_of(&deferred.value().unwrap()), "ConsoleLogger");

        let weak = scope.downgrade();
        drop(scope);
        assert!(weak.upgrade().is_err());

        let fresh = container.begin_scope().unwrap();
        let greeter = fresh.resolve(&service("LazyGreeter")).unwrap();
        let deferred = downcast::<Deferred>(test_support::component(&greeter).dependencies[0].clone(), &lazy).unwrap();
        drop(fresh);
        assert_eq!(deferred.value().unwrap_err().kind(), ErrorKind::Disposed);
    }

    #[test]
    fn test_concurrent_singleton_is_built_once() {
        let (container, fixture) = fixture();
        container
            .register_singleton(service("ILogger"), service("ConsoleLogger"))
            .unwrap();
        let logger = service("ILogger");

        let resolved: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| container.resolve(&logger).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));
        assert_eq!(fixture.created.load(Ordering::SeqCst), 1);

        let scope = container.begin_scope().unwrap();
        assert!(Arc::ptr_eq(&scope.resolve(&logger).unwrap(), &resolved[0]));
        let registration = &container.registration_mappings()[0].1;
        assert!(container.contains_instance(registration.id()));
        assert!(!scope.contains_instance(registration.id()));
    }

    #[test]
    fn test_scoped_and_named_scope_lifetimes() {
        let (container, fixture) = fixture();
        container
            .register_type(
                service("ILogger"),
                service("ConsoleLogger"),
                RegistrationOptions::new().in_named_scope("request"),
            )
            .unwrap();
        let logger = service("ILogger");

        // not eligible outside a scope called "request"
        assert!(container.try_resolve(&logger).unwrap().is_none());

        let request = container.begin_named_scope("request").unwrap();
        let inner = request.begin_scope().unwrap();
        let a = request.resolve(&logger).unwrap();
        let b = inner.resolve(&logger).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = container.begin_named_scope("request").unwrap();
        assert!(!Arc::ptr_eq(&other.resolve(&logger).unwrap(), &a));
        assert_eq!(fixture.created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disposal_in_reverse_creation_order() {
        let (container, fixture) = fixture();
        container.register_scoped(service("Connection"), service("Connection")).unwrap();
        container.register(service("Session"), service("Session")).unwrap();
        let scope = container.begin_scope().unwrap();
        scope.resolve(&service("Session")).unwrap();
        scope.dispose();
        scope.dispose();

        assert_eq!(*fixture.disposed.lock().unwrap(), vec!["Session", "Connection"]);

        container.dispose();
        assert_eq!(fixture.disposed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_disposal_tracking_opt_out() {
        let (container, fixture) = fixture();
        container
            .register_type(
                service("Connection"),
                service("Connection"),
                RegistrationOptions::new().without_disposal_tracking(),
            )
            .unwrap();

        let scope = container.begin_scope().unwrap();
        scope.resolve(&service("Connection")).unwrap();
        scope.dispose();
        assert!(fixture.disposed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decorator_wraps_original() {
        let container = fixture_container();
        container.register(service("ILogger"), service("ConsoleLogger")).unwrap();
        container
            .register_decorator(service("ILogger"), service("LoggerDecorator"), RegistrationOptions::new())
            .unwrap();

        let logger = container.resolve(&service("ILogger")).unwrap();
        assert_eq!(test_support::kind_of(&logger), "LoggerDecorator");
        assert_eq!(test_support::dependency_kinds(&logger), vec!["ConsoleLogger"]);

        // decorators stack innermost-first
        container
            .register_decorator(service("ILogger"), service("LoggerDecorator"), RegistrationOptions::new().named("outer"))
            .unwrap();
        let logger = container.resolve(&service("ILogger")).unwrap();
        let inner = &test_support::component(&logger).dependencies[0];
        assert_eq!(test_support::kind_of(inner), "LoggerDecorator");
        assert_eq!(test_support::dependency_kinds(inner), vec!["ConsoleLogger"]);

        // remapping leaves a single decorator
        container
            .remap_decorator(service("ILogger"), service("LoggerDecorator"), RegistrationOptions::new())
            .unwrap();
        let logger = container.resolve(&service("ILogger")).unwrap();
        assert_eq!(test_support::dependency_kinds(&logger), vec!["ConsoleLogger"]);
    }

    #[test]
    fn test_open_generic_decorator() {
        let container = fixture_container();
        container
            .register(
                ServiceType::definition("IRepository", 1),
                ServiceType::definition("SqlRepository", 1),
            )
            .unwrap();
        container
            .register_decorator(
                ServiceType::definition("IRepository", 1),
                ServiceType::definition("LoggingRepository", 1),
                RegistrationOptions::new(),
            )
            .unwrap();

        let users = ServiceType::generic("IRepository", [service("User")]);
        let resolved = container.resolve(&users).unwrap();
        assert_eq!(test_support::kind_of(&resolved), "LoggingRepository<User>");
        assert_eq!(test_support::dependency_kinds(&resolved), vec!["SqlRepository<User>"]);
    }

    #[test]
    fn test_reregistration_invalidates_cached_factories() {
        let container = fixture_container();
        container.register(service("ILogger"), service("ConsoleLogger")).unwrap();
        container.register(service("Greeter"), service("Greeter")).unwrap();

        let greeter = container.resolve(&service("Greeter")).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["ConsoleLogger"]);

        container
            .remap(service("ILogger"), service("FileLogger"), RegistrationOptions::new())
            .unwrap();
        let greeter = container.resolve(&service("Greeter")).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["FileLogger"]);

        // child scopes created earlier see the new binding too
        let scope = container.begin_scope().unwrap();
        scope.resolve(&service("Greeter")).unwrap();
        container
            .register_type(
                service("ILogger"),
                service("ConsoleLogger"),
                RegistrationOptions::new().replace_existing(),
            )
            .unwrap();
        let greeter = scope.resolve(&service("Greeter")).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["ConsoleLogger"]);
    }

    #[test]
    fn test_default_values_and_injection_methods() {
        let container = fixture_container();
        container.register(service("Paginator"), service("Paginator")).unwrap();
        container.register(service("Mailer"), service("Mailer")).unwrap();

        let paginator = container.resolve(&service("Paginator")).unwrap();
        assert_eq!(test_support::dependency_kinds(&paginator), vec!["DefaultPageSize"]);

        assert_eq!(
            container.resolve(&service("Mailer")).unwrap_err().kind(),
            ErrorKind::ResolutionFailed
        );
        container.register(service("IClock"), service("SystemClock")).unwrap();
        let mailer = container.resolve(&service("Mailer")).unwrap();
        assert_eq!(test_support::member_kinds(&mailer), vec!["SystemClock"]);
    }

    #[test]
    fn test_build_up_activate_and_factories() {
        let container = fixture_container();
        container.register(service("IClock"), service("SystemClock")).unwrap();

        let existing = instance(Component::leaf("Existing"));
        let built = container.build_up(Arc::clone(&existing), &service("Notifier")).unwrap();
        assert!(Arc::ptr_eq(&built, &existing));
        assert_eq!(test_support::member_kinds(&built), vec!["SystemClock"]);

        // Greeter is not registered and ILogger only comes from the override
        let greeter = container
            .activate(
                &service("Greeter"),
                &[DependencyOverride::new(service("ILogger"), instance(Component::leaf("Given")))],
            )
            .unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["Given"]);
        assert_eq!(
            container.activate(&service("ILogger"), &[]).unwrap_err().kind(),
            ErrorKind::NoUsableConstructor
        );

        container.register(service("Greeter"), service("Greeter")).unwrap();
        let factory = container
            .resolve_factory(&service("Greeter"), None, &[service("ILogger")])
            .unwrap();
        let greeter = factory.call(vec![instance(Component::leaf("Argument"))]).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["Argument"]);
    }

    #[test]
    fn test_named_instances_in_scope() {
        let container = fixture_container();
        let logger = service("ILogger");
        let scope = container.begin_scope().unwrap();
        scope
            .put_named_instance_in_scope(&logger, "audit", instance(Component::leaf("ScopedAudit")))
            .unwrap();

        assert_eq!(
            test_support::kind_of(&scope.resolve_named(&logger, "audit").unwrap()),
            "ScopedAudit"
        );
        assert!(scope.try_resolve(&logger).unwrap().is_none());
        assert!(scope.can_resolve(&logger, Some("audit")).unwrap());
    }

    #[test]
    fn test_typed_access() {
        let container = Container::new();
        container
            .register_instance(ServiceType::of::<String>(), instance(String::from("primary")), RegistrationOptions::new())
            .unwrap();
        container
            .register_instance(
                ServiceType::of::<String>(),
                instance(String::from("backup")),
                RegistrationOptions::new().named("backup"),
            )
            .unwrap();

        assert_eq!(container.get_named::<String>("backup").unwrap().as_str(), "backup");
        assert!(container.try_get::<u32>().unwrap().is_none());
        assert_eq!(
            container.resolve_as::<u32>(&ServiceType::of::<String>()).unwrap_err().kind(),
            ErrorKind::CreationFailed
        );
    }
}

//! Object-graph container
//!
//! The [`Container`] owns the registration and decorator stores and the
//! root [`ResolutionScope`]. Registration publishes a new store version;
//! every plan cached against an older version is replanned on next use.

use crate::config::{ContainerConfiguration, RegistrationBehavior};
use crate::introspect::{TypeCatalog, TypeIntrospector};
use crate::registration::{Counters, ImplementationSource, RegistrationOptions, Replace, ServiceRegistration};
use crate::scope::ResolutionScope;
use crate::store::{DecoratorStore, Duplicates, RegistrationStore, StoreUpdate};
use crate::tree::Swap;
use crate::validate;
use crate::{DiError, Instance, Result, ServiceType};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::debug;

/// State shared by every scope of one container.
pub(crate) struct ContainerContext {
    pub(crate) registrations: RegistrationStore,
    pub(crate) decorators: DecoratorStore,
    pub(crate) counters: Arc<Counters>,
    config: Swap<ContainerConfiguration>,
    config_version: AtomicU64,
    parent: Option<Arc<ContainerContext>>,
    introspector: Arc<dyn TypeIntrospector>,
}

impl ContainerContext {
    fn new(
        introspector: Arc<dyn TypeIntrospector>,
        config: ContainerConfiguration,
        parent: Option<Arc<ContainerContext>>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            registrations: RegistrationStore::new(),
            decorators: DecoratorStore::new(),
            counters,
            config: Swap::new(config),
            config_version: AtomicU64::new(0),
            parent,
            introspector,
        }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Option<&ContainerContext> {
        self.parent.as_deref()
    }

    #[inline]
    pub(crate) fn introspector(&self) -> &dyn TypeIntrospector {
        &*self.introspector
    }

    #[inline]
    pub(crate) fn config(&self) -> Arc<ContainerConfiguration> {
        self.config.load()
    }

    /// Sum of every planning input's version along the container chain.
    pub(crate) fn version(&self) -> u64 {
        let local = self.registrations.version()
            + self.decorators.version()
            + self.config_version.load(Ordering::SeqCst);
        local + self.parent.as_ref().map_or(0, |parent| parent.version())
    }
}

/// Which store a registration goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Services,
    Decorators,
}

/// Object-graph container.
///
/// Dereferences to its root [`ResolutionScope`], so every resolution
/// operation is available directly on the container.
///
/// # Examples
///
/// ```rust
/// use ioc_graph::{Container, DependencySite, ServiceType, TypeCatalog, TypeDescriptor, instance};
/// use std::sync::Arc;
///
/// struct Greeter {
///     greeting: Arc<String>,
/// }
///
/// let catalog = TypeCatalog::new();
/// catalog.describe(
///     TypeDescriptor::new("Greeter").constructor(
///         [DependencySite::param("greeting", ServiceType::of::<String>())],
///         |_, mut args| {
///             let greeting = args.remove(0).downcast::<String>().map_err(|_| {
///                 ioc_graph::DiError::creation_failed(&ServiceType::named("Greeter"), "greeting")
///             })?;
///             Ok(instance(Greeter { greeting }))
///         },
///     ),
/// );
///
/// let container = Container::with_introspector(Arc::new(catalog));
/// container
///     .register_instance(ServiceType::of::<String>(), instance(String::from("hello")), Default::default())
///     .unwrap();
/// container.register(ServiceType::named("Greeter"), ServiceType::named("Greeter")).unwrap();
///
/// let greeter = container.resolve_as::<Greeter>(&ServiceType::named("Greeter")).unwrap();
/// assert_eq!(greeter.greeting.as_str(), "hello");
/// ```
#[derive(Clone)]
pub struct Container {
    root: ResolutionScope,
}

impl Container {
    /// A container over an empty [`TypeCatalog`].
    pub fn new() -> Self {
        Self::with_introspector(Arc::new(TypeCatalog::new()))
    }

    /// A container answering type questions through `introspector`.
    pub fn with_introspector(introspector: Arc<dyn TypeIntrospector>) -> Self {
        Self::with_configuration(introspector, ContainerConfiguration::default())
    }

    pub fn with_configuration(introspector: Arc<dyn TypeIntrospector>, config: ContainerConfiguration) -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "ioc_graph", ?config, "Creating root container");

        let context = ContainerContext::new(introspector, config, None, Arc::new(Counters::default()));
        Self {
            root: ResolutionScope::container_root(Arc::new(context), None),
        }
    }

    /// Publish a modified configuration. Cached plans are replanned.
    pub fn configure<F>(&self, configure: F) -> Result<()>
    where
        F: FnOnce(ContainerConfiguration) -> ContainerConfiguration,
    {
        self.ensure_alive()?;

        let context = self.context();
        let next = configure((*context.config()).clone());

        #[cfg(feature = "logging")]
        debug!(target: "ioc_graph", config = ?next, "Reconfiguring container");

        context.config.replace(next);
        context.config_version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn configuration(&self) -> Arc<ContainerConfiguration> {
        self.context().config()
    }

    pub fn introspector(&self) -> &dyn TypeIntrospector {
        self.context().introspector()
    }

    /// A child container with its own stores.
    ///
    /// Lookups the child cannot satisfy fall back to this container's
    /// stores. The child starts from a copy of this container's
    /// configuration, passed through `configure`.
    pub fn create_child_container<F>(&self, configure: F) -> Result<Container>
    where
        F: FnOnce(ContainerConfiguration) -> ContainerConfiguration,
    {
        self.ensure_alive()?;

        let parent = self.context();
        let config = configure((*parent.config()).clone());

        #[cfg(feature = "logging")]
        debug!(target: "ioc_graph", ?config, "Creating child container");

        let context = ContainerContext::new(
            Arc::clone(&parent.introspector),
            config,
            Some(Arc::clone(parent)),
            Arc::clone(&parent.counters),
        );
        Ok(Self {
            root: ResolutionScope::container_root(Arc::new(context), Some(self.root.clone())),
        })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Bind `implementation` to `service_type` as a transient.
    #[inline]
    pub fn register(&self, service_type: ServiceType, implementation: ServiceType) -> Result<()> {
        self.register_type(service_type, implementation, RegistrationOptions::new())
    }

    #[inline]
    pub fn register_singleton(&self, service_type: ServiceType, implementation: ServiceType) -> Result<()> {
        self.register_type(service_type, implementation, RegistrationOptions::new().singleton())
    }

    #[inline]
    pub fn register_scoped(&self, service_type: ServiceType, implementation: ServiceType) -> Result<()> {
        self.register_type(service_type, implementation, RegistrationOptions::new().scoped())
    }

    /// Bind `implementation` to `service_type`.
    ///
    /// Open generic definitions bind to open generic definitions and are
    /// closed per request.
    pub fn register_type(
        &self,
        service_type: ServiceType,
        implementation: ServiceType,
        options: RegistrationOptions,
    ) -> Result<()> {
        let (service_type, implementation) = self.check_implementation(service_type, implementation)?;
        self.add(
            StoreKind::Services,
            service_type,
            ImplementationSource::Type(implementation),
            options,
            false,
        )
    }

    /// Bind a delegate receiving the resolving scope.
    pub fn register_factory<F>(&self, service_type: ServiceType, factory: F, options: RegistrationOptions) -> Result<()>
    where
        F: Fn(&ResolutionScope) -> Result<Instance> + Send + Sync + 'static,
    {
        self.add(
            StoreKind::Services,
            service_type,
            ImplementationSource::Factory(Arc::new(factory)),
            options,
            false,
        )
    }

    /// Bind a pre-built instance. Instances are never disposal-tracked.
    pub fn register_instance(&self, service_type: ServiceType, value: Instance, options: RegistrationOptions) -> Result<()> {
        self.add(
            StoreKind::Services,
            service_type,
            ImplementationSource::Instance(value),
            options,
            false,
        )
    }

    /// Replace every binding of `service_type` with this one.
    pub fn remap(&self, service_type: ServiceType, implementation: ServiceType, options: RegistrationOptions) -> Result<()> {
        let (service_type, implementation) = self.check_implementation(service_type, implementation)?;
        self.add(
            StoreKind::Services,
            service_type,
            ImplementationSource::Type(implementation),
            options,
            true,
        )
    }

    /// Wrap every resolution of `service_type` in `decorator`.
    ///
    /// The decorator's constructor parameters of type `service_type` receive
    /// the instance being decorated. Decorators apply innermost-first in
    /// registration order.
    pub fn register_decorator(
        &self,
        service_type: ServiceType,
        decorator: ServiceType,
        options: RegistrationOptions,
    ) -> Result<()> {
        let (service_type, decorator) = self.check_implementation(service_type, decorator)?;
        self.add(
            StoreKind::Decorators,
            service_type,
            ImplementationSource::Type(decorator),
            options,
            false,
        )
    }

    /// Replace every decorator of `service_type` with this one.
    pub fn remap_decorator(
        &self,
        service_type: ServiceType,
        decorator: ServiceType,
        options: RegistrationOptions,
    ) -> Result<()> {
        let (service_type, decorator) = self.check_implementation(service_type, decorator)?;
        self.add(
            StoreKind::Decorators,
            service_type,
            ImplementationSource::Type(decorator),
            options,
            true,
        )
    }

    /// Validate the implementation against the contract, normalizing open
    /// generics to their definitions.
    fn check_implementation(
        &self,
        service_type: ServiceType,
        implementation: ServiceType,
    ) -> Result<(ServiceType, ServiceType)> {
        let introspector = self.introspector();
        let service_type = open_definition(service_type);
        let implementation = open_definition(implementation);

        if service_type.is_open_generic() != implementation.is_open_generic() {
            return Err(DiError::invalid_registration(
                &service_type,
                &implementation,
                "open generic services need open generic implementations",
            ));
        }
        if !implementation.is_open_generic() && !introspector.is_concrete(&implementation) {
            return Err(DiError::invalid_registration(
                &service_type,
                &implementation,
                "implementation is not a concrete type",
            ));
        }
        if !introspector.is_assignable(&implementation, &service_type) {
            return Err(DiError::invalid_registration(
                &service_type,
                &implementation,
                "implementation does not implement the service type",
            ));
        }
        Ok((service_type, implementation))
    }

    fn add(
        &self,
        kind: StoreKind,
        service_type: ServiceType,
        source: ImplementationSource,
        options: RegistrationOptions,
        remap: bool,
    ) -> Result<()> {
        self.ensure_alive()?;

        let context = self.context();
        let store = match kind {
            StoreKind::Services => &context.registrations,
            StoreKind::Decorators => &context.decorators,
        };
        let replace = options.replace;
        let registration = Arc::new(ServiceRegistration::new(&context.counters, service_type.clone(), source, options));

        let duplicates = match replace {
            Replace::Existing => Duplicates::Replace,
            Replace::OnlyIfExists => Duplicates::ReplaceOnly,
            Replace::Default => match context.config().registration_behavior() {
                RegistrationBehavior::Throw => Duplicates::Reject,
                RegistrationBehavior::Skip => Duplicates::Skip,
                RegistrationBehavior::ReplaceExisting => Duplicates::Replace,
                RegistrationBehavior::ReplaceIfExists => Duplicates::ReplaceOnly,
                RegistrationBehavior::PreserveAll => Duplicates::Keep,
            },
        };

        let outcome = store.add_or_update(&service_type, Arc::clone(&registration), remap, duplicates);

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            service = %service_type,
            implementation = %registration.implementation_type(),
            lifetime = %registration.lifetime(),
            name = registration.name(),
            store = ?kind,
            ?outcome,
            "Registering service"
        );

        if outcome == StoreUpdate::Rejected {
            return Err(DiError::already_registered(&service_type, registration.implementation_type()));
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether a binding for `service_type` (under `name`, when given)
    /// exists in this container or an ancestor.
    pub fn is_registered(&self, service_type: &ServiceType, name: Option<&str>) -> bool {
        std::iter::successors(Some(&**self.context()), |c| c.parent()).any(|context| {
            context
                .registrations
                .candidates(service_type)
                .iter()
                .any(|r| name.is_none_or(|name| r.name() == Some(name)))
        })
    }

    /// Every `(service type, registration)` pair of this container.
    pub fn registration_mappings(&self) -> Vec<(ServiceType, Arc<ServiceRegistration>)> {
        self.context().registrations.mappings()
    }

    /// Plan every registration and collect every failure.
    pub fn validate(&self) -> std::result::Result<(), Vec<DiError>> {
        validate::validate(&self.root)
    }
}

/// Open generic types are stored under their definition.
fn open_definition(ty: ServiceType) -> ServiceType {
    if ty.contains_parameters() {
        ty.generic_definition().unwrap_or(ty)
    } else {
        ty
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Container {
    type Target = ResolutionScope;

    #[inline]
    fn deref(&self) -> &ResolutionScope {
        &self.root
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = self.context();
        f.debug_struct("Container")
            .field("registrations", &context.registrations.mappings().len())
            .field("child", &context.parent.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::test_support::{self, fixture, fixture_container, service};

    #[test]
    fn test_registration_behaviors() {
        let logger = service("ILogger");
        let kinds = |container: &Container| -> Vec<String> {
            container
                .resolve_all(&logger)
                .unwrap()
                .iter()
                .map(test_support::kind_of)
                .collect()
        };

        // skip keeps the first binding of an implementation
        let container = fixture_container();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container.register(logger.clone(), service("FileLogger")).unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        assert_eq!(kinds(&container), vec!["ConsoleLogger", "FileLogger"]);

        let container = fixture_container();
        container
            .configure(|c| c.with_registration_behavior(RegistrationBehavior::Throw))
            .unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        let err = container.register(logger.clone(), service("ConsoleLogger")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);

        let container = fixture_container();
        container
            .configure(|c| c.with_registration_behavior(RegistrationBehavior::ReplaceExisting))
            .unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container.register(logger.clone(), service("FileLogger")).unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        assert_eq!(kinds(&container), vec!["FileLogger", "ConsoleLogger"]);

        let container = fixture_container();
        container
            .configure(|c| c.with_registration_behavior(RegistrationBehavior::ReplaceIfExists))
            .unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        assert!(!container.is_registered(&logger, None));

        let container = fixture_container();
        container
            .configure(|c| c.with_registration_behavior(RegistrationBehavior::PreserveAll))
            .unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        assert_eq!(kinds(&container), vec!["ConsoleLogger", "ConsoleLogger"]);
    }

    #[test]
    fn test_concurrent_duplicates_under_throw() {
        let logger = service("ILogger");
        for _ in 0..32 {
            let container = fixture_container();
            container
                .configure(|c| c.with_registration_behavior(RegistrationBehavior::Throw))
                .unwrap();

            let results: Vec<Result<()>> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..4)
                    .map(|_| s.spawn(|| container.register(logger.clone(), service("ConsoleLogger"))))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(
                results
                    .iter()
                    .filter_map(|r| r.as_ref().err())
                    .all(|e| e.kind() == ErrorKind::AlreadyRegistered)
            );
            assert_eq!(container.resolve_all(&logger).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_per_registration_replace_options() {
        let logger = service("ILogger");
        let container = fixture_container();

        container
            .register_type(
                logger.clone(),
                service("FileLogger"),
                RegistrationOptions::new().replace_only_if_exists(),
            )
            .unwrap();
        assert!(!container.is_registered(&logger, None));

        container.register(logger.clone(), service("FileLogger")).unwrap();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container
            .register_type(logger.clone(), service("FileLogger"), RegistrationOptions::new().replace_existing())
            .unwrap();
        assert_eq!(test_support::kind_of(&container.resolve(&logger).unwrap()), "FileLogger");
        assert_eq!(container.registration_mappings().len(), 2);
    }

    #[test]
    fn test_invalid_registrations() {
        let container = fixture_container();
        let err = container.register(service("ILogger"), service("SystemClock")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegistration);

        let err = container.register(service("ILogger"), service("ILogger")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegistration);

        let err = container
            .register(ServiceType::definition("IRepository", 1), service("UserRepository"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegistration);

        // placeholder-bearing types are stored under their definition
        container
            .register(
                ServiceType::generic("IRepository", [ServiceType::param(0)]),
                ServiceType::definition("SqlRepository", 1),
            )
            .unwrap();
        assert!(container.is_registered(&ServiceType::definition("IRepository", 1), None));
    }

    #[test]
    fn test_remap_replaces_all_bindings() {
        let logger = service("ILogger");
        let container = fixture_container();
        container.register(logger.clone(), service("ConsoleLogger")).unwrap();
        container.register(logger.clone(), service("FileLogger")).unwrap();

        container
            .remap(logger.clone(), service("ConsoleLogger"), RegistrationOptions::new())
            .unwrap();
        assert_eq!(container.resolve_all(&logger).unwrap().len(), 1);
        assert_eq!(test_support::kind_of(&container.resolve(&logger).unwrap()), "ConsoleLogger");
    }

    #[test]
    fn test_factory_and_instance_registrations() {
        let (container, fixture) = fixture();
        let clock = service("IClock");
        container
            .register_factory(
                clock.clone(),
                |_: &ResolutionScope| -> Result<Instance> {
                    Ok(crate::instance(test_support::Component::leaf("FactoryClock")))
                },
                RegistrationOptions::new(),
            )
            .unwrap();
        assert_eq!(test_support::kind_of(&container.resolve(&clock).unwrap()), "FactoryClock");

        let shared = crate::instance(test_support::Component::leaf("SharedLogger"));
        container
            .register_instance(service("ILogger"), Arc::clone(&shared), RegistrationOptions::new())
            .unwrap();
        assert!(Arc::ptr_eq(&container.resolve(&service("ILogger")).unwrap(), &shared));

        container.dispose();
        assert!(fixture.disposed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_initializer_runs_after_members() {
        let container = fixture_container();
        container.register(service("IClock"), service("SystemClock")).unwrap();
        container
            .register_type(
                service("Notifier"),
                service("Notifier"),
                RegistrationOptions::new().with_initializer(|value: &Instance, _: &ResolutionScope| -> Result<()> {
                    let notifier = test_support::component(value);
                    let members = notifier.members.lock().unwrap().len();
                    notifier
                        .members
                        .lock()
                        .unwrap()
                        .push(crate::instance(test_support::Component::leaf(format!("Init{members}"))));
                    Ok(())
                }),
            )
            .unwrap();

        let notifier = container.resolve(&service("Notifier")).unwrap();
        assert_eq!(test_support::member_kinds(&notifier), vec!["SystemClock", "Init1"]);
    }

    #[test]
    fn test_child_container_falls_back_to_parent() {
        let parent = fixture_container();
        parent.register(service("ILogger"), service("ConsoleLogger")).unwrap();
        parent.register_singleton(service("IClock"), service("SystemClock")).unwrap();

        let child = parent.create_child_container(|c| c).unwrap();
        child.register(service("Greeter"), service("Greeter")).unwrap();

        let greeter = child.resolve(&service("Greeter")).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["ConsoleLogger"]);
        assert!(parent.try_resolve(&service("Greeter")).unwrap().is_none());

        // child registrations shadow the parent's
        child.register(service("ILogger"), service("FileLogger")).unwrap();
        let greeter = child.resolve(&service("Greeter")).unwrap();
        assert_eq!(test_support::dependency_kinds(&greeter), vec!["FileLogger"]);

        // singletons stay in the parent unless the child rebuilds them
        let from_parent = parent.resolve(&service("IClock")).unwrap();
        assert!(Arc::ptr_eq(&child.resolve(&service("IClock")).unwrap(), &from_parent));

        let rebuilding = parent
            .create_child_container(|c| c.with_rebuild_singletons_in_child(true))
            .unwrap();
        let rebuilt = rebuilding.resolve(&service("IClock")).unwrap();
        assert!(!Arc::ptr_eq(&rebuilt, &from_parent));
        assert!(Arc::ptr_eq(&rebuilding.resolve(&service("IClock")).unwrap(), &rebuilt));
    }

    #[test]
    fn test_disposed_container_rejects_everything() {
        let container = fixture_container();
        container.dispose();

        let err = container.register(service("ILogger"), service("ConsoleLogger")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disposed);
        assert_eq!(container.configure(|c| c).unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(
            container.create_child_container(|c| c).unwrap_err().kind(),
            ErrorKind::Disposed
        );
        assert_eq!(container.validate().unwrap_err()[0].kind(), ErrorKind::Disposed);
        assert_eq!(
            container.can_resolve(&service("ILogger"), None).unwrap_err().kind(),
            ErrorKind::Disposed
        );
    }
}

//! Service registrations
//!
//! A [`ServiceRegistration`] is immutable once created. Re-registering or
//! remapping publishes a new store version holding a new registration; the
//! old one is never touched.

use crate::introspect::DependencySite;
use crate::lifetime::Lifetime;
use crate::scope::ResolutionScope;
use crate::{Instance, Result, ServiceType};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identity of a registration for the lifetime of its container tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Raw id value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

/// Id and ordering counters shared by a container and all of its children.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    ids: AtomicU64,
    numbers: AtomicU64,
}

impl Counters {
    #[inline]
    fn next_id(&self) -> RegistrationId {
        RegistrationId(self.ids.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Strictly increasing across every registration of the container tree.
    #[inline]
    fn next_number(&self) -> u64 {
        self.numbers.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Delegate producing an instance from the resolving scope.
pub type FactoryDelegate = Arc<dyn Fn(&ResolutionScope) -> Result<Instance> + Send + Sync>;

/// Predicate over the dependency site a registration is about to satisfy.
pub type Condition = Arc<dyn Fn(&DependencySite) -> bool + Send + Sync>;

/// Callback run after construction and member injection.
pub type Initializer = Arc<dyn Fn(&Instance, &ResolutionScope) -> Result<()> + Send + Sync>;

/// What a registration produces.
#[derive(Clone)]
pub enum ImplementationSource {
    /// Construct the implementation type through its constructors
    Type(ServiceType),
    /// Invoke a user delegate
    Factory(FactoryDelegate),
    /// Hand out a pre-built instance
    Instance(Instance),
}

impl fmt::Debug for ImplementationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => write!(f, "Type({ty})"),
            Self::Factory(_) => f.write_str("Factory"),
            Self::Instance(_) => f.write_str("Instance"),
        }
    }
}

/// Per-registration options.
///
/// ```rust
/// use ioc_graph::RegistrationOptions;
///
/// let options = RegistrationOptions::new().singleton().named("primary");
/// assert_eq!(options.name(), Some("primary"));
/// ```
#[derive(Clone)]
pub struct RegistrationOptions {
    pub(crate) lifetime: Lifetime,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) track_disposal: bool,
    pub(crate) replace: Replace,
}

/// Per-registration override of the container's duplicate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replace {
    /// Follow the container configuration
    Default,
    /// Replace a registration with the same identity, else add
    Existing,
    /// Replace a registration with the same identity, else do nothing
    OnlyIfExists,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            lifetime: Lifetime::Transient,
            name: None,
            conditions: Vec::new(),
            initializer: None,
            track_disposal: true,
            replace: Replace::Default,
        }
    }
}

impl RegistrationOptions {
    /// Transient, unnamed, unconditional.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    /// Cache in the nearest scope called `scope_name`; only eligible inside one.
    pub fn in_named_scope(self, scope_name: impl Into<Arc<str>>) -> Self {
        self.with_lifetime(Lifetime::NamedScope(scope_name.into()))
    }

    /// Binding key a consumer must request explicitly.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Eligible only for dependency sites accepted by `predicate`.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DependencySite) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Arc::new(predicate));
        self
    }

    /// Eligible only when injected into `parent`.
    pub fn when_dependant_is(self, parent: ServiceType) -> Self {
        self.when(move |site| site.parent.as_ref() == Some(&parent))
    }

    /// Eligible only for sites carrying `attribute`.
    pub fn when_has(self, attribute: impl Into<Arc<str>>) -> Self {
        let attribute = attribute.into();
        self.when(move |site| site.attributes.iter().any(|a| *a == attribute))
    }

    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&Instance, &ResolutionScope) -> Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    /// Instances are not added to any disposal list.
    pub fn without_disposal_tracking(mut self) -> Self {
        self.track_disposal = false;
        self
    }

    /// Replace a registration with the same identity even when the
    /// container policy would throw or skip.
    pub fn replace_existing(mut self) -> Self {
        self.replace = Replace::Existing;
        self
    }

    /// Replace a registration with the same identity; register nothing
    /// when there is none.
    pub fn replace_only_if_exists(mut self) -> Self {
        self.replace = Replace::OnlyIfExists;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }
}

/// An immutable service-to-implementation binding.
pub struct ServiceRegistration {
    id: RegistrationId,
    number: u64,
    service_type: ServiceType,
    implementation_type: ServiceType,
    source: ImplementationSource,
    lifetime: Lifetime,
    name: Option<Arc<str>>,
    conditions: Arc<[Condition]>,
    initializer: Option<Initializer>,
    track_disposal: bool,
}

impl ServiceRegistration {
    pub(crate) fn new(
        counters: &Counters,
        service_type: ServiceType,
        source: ImplementationSource,
        options: RegistrationOptions,
    ) -> Self {
        let implementation_type = match &source {
            ImplementationSource::Type(ty) => ty.clone(),
            _ => service_type.clone(),
        };
        Self {
            id: counters.next_id(),
            number: counters.next_number(),
            service_type,
            implementation_type,
            source,
            lifetime: options.lifetime,
            name: options.name,
            conditions: options.conditions.into(),
            initializer: options.initializer,
            track_disposal: options.track_disposal,
        }
    }

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Insertion order; strictly increasing.
    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// The implementation type, or the service type for factory and
    /// instance registrations.
    #[inline]
    pub fn implementation_type(&self) -> &ServiceType {
        &self.implementation_type
    }

    #[inline]
    pub fn source(&self) -> &ImplementationSource {
        &self.source
    }

    #[inline]
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn has_condition(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Any condition accepts the site. Unconditional registrations accept all.
    pub fn accepts(&self, site: &DependencySite) -> bool {
        self.conditions.is_empty() || self.conditions.iter().any(|condition| condition(site))
    }

    #[inline]
    pub(crate) fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    #[inline]
    pub(crate) fn tracks_disposal(&self) -> bool {
        self.track_disposal && !matches!(self.source, ImplementationSource::Instance(_))
    }

    /// Registered against an open generic definition.
    #[inline]
    pub fn is_open_generic(&self) -> bool {
        self.implementation_type.is_open_generic()
    }

    /// Duplicate-detection identity: same implementation under the same name.
    /// Factory and instance registrations are unique by construction.
    pub(crate) fn same_identity(&self, other: &ServiceRegistration) -> bool {
        match (&self.source, &other.source) {
            (ImplementationSource::Type(a), ImplementationSource::Type(b)) => a == b && self.name == other.name,
            _ => false,
        }
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("id", &self.id)
            .field("number", &self.number)
            .field("service_type", &self.service_type)
            .field("source", &self.source)
            .field("lifetime", &self.lifetime)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(counters: &Counters, implementation: &str, options: RegistrationOptions) -> ServiceRegistration {
        ServiceRegistration::new(
            counters,
            ServiceType::named("IService"),
            ImplementationSource::Type(ServiceType::named(implementation)),
            options,
        )
    }

    #[test]
    fn test_numbers_strictly_increase() {
        let counters = Counters::default();
        let a = register(&counters, "A", RegistrationOptions::new());
        let b = register(&counters, "B", RegistrationOptions::new());
        assert!(b.number() > a.number());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_identity() {
        let counters = Counters::default();
        let a = register(&counters, "A", RegistrationOptions::new());
        let a2 = register(&counters, "A", RegistrationOptions::new().singleton());
        let named = register(&counters, "A", RegistrationOptions::new().named("x"));
        let factory = ServiceRegistration::new(
            &counters,
            ServiceType::named("IService"),
            ImplementationSource::Factory(Arc::new(|_: &ResolutionScope| -> Result<Instance> { Ok(crate::instance(1u8)) })),
            RegistrationOptions::new(),
        );

        assert!(a.same_identity(&a2));
        assert!(!a.same_identity(&named));
        assert!(!factory.same_identity(&factory));
        assert_eq!(factory.implementation_type(), &ServiceType::named("IService"));
    }

    #[test]
    fn test_conditions() {
        let counters = Counters::default();
        let consumer = ServiceType::named("Consumer");
        let reg = register(
            &counters,
            "A",
            RegistrationOptions::new()
                .when_dependant_is(consumer.clone())
                .when_has("Primary"),
        );

        let site = DependencySite::new(ServiceType::named("IService"));
        assert!(reg.has_condition());
        assert!(!reg.accepts(&site));
        assert!(reg.accepts(&site.clone().with_parent(consumer)));
        assert!(reg.accepts(&site.with_attribute("Primary")));
    }
}

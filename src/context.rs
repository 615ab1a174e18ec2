//! Per-request resolution state

use crate::config::ContainerConfiguration;
use crate::container::ContainerContext;
use crate::introspect::{DependencySite, TypeIntrospector};
use crate::plan::Plan;
use crate::registration::RegistrationId;
use crate::scope::ResolutionScope;
use crate::{Injectable, Instance, ServiceType, instance};
use std::collections::HashSet;
use std::sync::Arc;

/// An explicit per-call value that wins over every registration.
///
/// Named overrides match a site's binding key or member name; typed ones
/// match any site whose requested type the override's type is assignable
/// to. Named overrides are consulted first.
#[derive(Clone)]
pub struct DependencyOverride {
    pub(crate) service_type: ServiceType,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) instance: Instance,
}

impl DependencyOverride {
    pub fn new(service_type: ServiceType, instance: Instance) -> Self {
        Self {
            service_type,
            name: None,
            instance,
        }
    }

    pub fn named(name: impl Into<Arc<str>>, service_type: ServiceType, instance: Instance) -> Self {
        Self {
            service_type,
            name: Some(name.into()),
            instance,
        }
    }

    /// Typed override identified by `T`'s type name.
    pub fn of<T: Injectable>(value: T) -> Self {
        Self::new(ServiceType::of::<T>(), instance(value))
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }
}

impl std::fmt::Debug for DependencyOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyOverride")
            .field("service_type", &self.service_type)
            .field("name", &self.name)
            .finish()
    }
}

/// A full resolution request.
///
/// ```rust
/// use ioc_graph::{ResolveRequest, ServiceType};
///
/// let request = ResolveRequest::new(ServiceType::named("ILogger"))
///     .named("audit")
///     .null_allowed();
/// assert!(request.is_null_allowed());
/// ```
#[derive(Clone, Debug)]
pub struct ResolveRequest {
    pub(crate) service_type: ServiceType,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) null_allowed: bool,
    pub(crate) overrides: Vec<DependencyOverride>,
}

impl ResolveRequest {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            name: None,
            null_allowed: false,
            overrides: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Return `None` instead of failing when nothing can satisfy the request.
    pub fn null_allowed(mut self) -> Self {
        self.null_allowed = true;
        self
    }

    pub fn with_override(mut self, dependency: DependencyOverride) -> Self {
        self.overrides.push(dependency);
        self
    }

    pub fn is_null_allowed(&self) -> bool {
        self.null_allowed
    }
}

/// Type/registration identity tracked for cycle detection.
pub(crate) type Identity = (Option<RegistrationId>, ServiceType);

/// State carried down one planning request.
///
/// The visited set lives here and nowhere else: identities are added on
/// entry to a subtree and removed on exit, so sibling subtrees may share
/// dependencies freely while re-entry along one chain is a cycle.
pub struct ResolutionContext<'a> {
    pub(crate) scope: &'a ResolutionScope,
    pub(crate) container: Arc<ContainerContext>,
    pub(crate) config: Arc<ContainerConfiguration>,
    scope_names: Vec<Arc<str>>,
    null_allowed: bool,
    overrides: &'a [DependencyOverride],
    visited: HashSet<Identity, ahash::RandomState>,
    func_parameters: Vec<Vec<ServiceType>>,
    validating: bool,
}

impl<'a> ResolutionContext<'a> {
    pub(crate) fn new(scope: &'a ResolutionScope, null_allowed: bool, overrides: &'a [DependencyOverride]) -> Self {
        let container = Arc::clone(scope.context());
        let config = container.config();
        Self {
            scope,
            container,
            config,
            scope_names: scope.scope_names(),
            null_allowed,
            overrides,
            visited: HashSet::with_hasher(ahash::RandomState::new()),
            func_parameters: Vec::new(),
            validating: false,
        }
    }

    /// Planning only: nothing planned under this context is executed.
    pub(crate) fn for_validation(scope: &'a ResolutionScope) -> Self {
        Self {
            validating: true,
            ..Self::new(scope, false, &[])
        }
    }

    /// Plan as if inside a scope called `name`.
    pub(crate) fn enter_scope_name(&mut self, name: impl Into<Arc<str>>) {
        self.scope_names.push(name.into());
    }

    pub fn null_allowed(&self) -> bool {
        self.null_allowed
    }

    /// Names of the enclosing scopes, innermost first.
    pub fn scope_names(&self) -> &[Arc<str>] {
        &self.scope_names
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn introspector(&self) -> &dyn TypeIntrospector {
        self.container.introspector()
    }

    pub fn configuration(&self) -> &ContainerConfiguration {
        &self.config
    }

    /// Record `identity` on the current chain; `false` if already on it.
    pub(crate) fn enter(&mut self, identity: Identity) -> bool {
        self.visited.insert(identity)
    }

    pub(crate) fn leave(&mut self, identity: &Identity) {
        self.visited.remove(identity);
    }

    /// Nothing entered yet: planning the request itself, not a dependency.
    #[inline]
    pub(crate) fn is_top_level(&self) -> bool {
        self.visited.is_empty()
    }

    pub(crate) fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Explicit override for `site`, if any.
    pub(crate) fn find_override(&self, site: &DependencySite) -> Option<Instance> {
        if self.overrides.is_empty() {
            return None;
        }

        let keys = [site.dependency_name.as_ref(), site.member_name.as_ref()];
        let named = self.overrides.iter().find(|o| {
            o.name
                .as_ref()
                .is_some_and(|name| keys.iter().flatten().any(|key| *key == name))
        });
        if let Some(found) = named {
            return Some(Arc::clone(&found.instance));
        }

        let introspector = self.introspector();
        self.overrides
            .iter()
            .filter(|o| o.name.is_none())
            .find(|o| introspector.is_assignable(&o.service_type, &site.requested))
            .map(|o| Arc::clone(&o.instance))
    }

    pub(crate) fn push_func_parameters(&mut self, parameters: Vec<ServiceType>) {
        self.func_parameters.push(parameters);
    }

    pub(crate) fn pop_func_parameters(&mut self) {
        self.func_parameters.pop();
    }

    /// Parameter of an enclosing parameterized factory matching `ty`,
    /// innermost factory first.
    pub(crate) fn find_argument(&self, ty: &ServiceType) -> Option<Plan> {
        self.func_parameters
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, parameters)| {
                parameters
                    .iter()
                    .position(|p| p == ty)
                    .map(|index| Plan::argument(ty.clone(), depth, index))
            })
    }

    /// This container and its ancestors, nearest first.
    pub(crate) fn containers(&self) -> impl Iterator<Item = &ContainerContext> + '_ {
        std::iter::successors(Some(&*self.container), |c| c.parent())
    }
}

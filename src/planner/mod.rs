//! Planning
//!
//! Turns a request into a [`Plan`]. Planning is a recursive walk over
//! dependency sites driven by a [`ResolutionContext`]:
//!
//! 1. explicit overrides
//! 2. instances put into the resolving scope
//! 3. arguments of an enclosing parameterized factory
//! 4. store candidates (falling back to parent containers)
//! 5. dependency-shape resolvers, built-in first, then external
//! 6. unknown-type resolution, when configured
//!
//! Binding selection filters candidates by generic compatibility, name,
//! scope name and condition, then takes the highest registration number.
//! The condition filter is skipped for the request itself and the name
//! filter for collections.

pub(crate) mod resolvers;

use crate::context::ResolutionContext;
use crate::introspect::{ConstraintKind, DependencySite};
use crate::plan::{Construct, Plan, Wiring};
use crate::registration::{ImplementationSource, RegistrationOptions, ServiceRegistration};
use crate::store::{Candidates, Duplicates, RegistrationStore};
use crate::{DiError, Result, ServiceType};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// A dependency-shape resolver.
///
/// Consulted when no registration satisfies a site. Resolvers recurse into
/// the context to plan the values they wrap.
///
/// # Example
///
/// ```rust
/// use ioc_graph::{DependencyResolver, DependencySite, Plan, ResolutionContext, Result, ServiceType, instance};
///
/// /// Answers every `Config` site with a fixed value.
/// struct ConfigResolver;
///
/// impl DependencyResolver for ConfigResolver {
///     fn can_handle(&self, _ctx: &ResolutionContext<'_>, site: &DependencySite) -> bool {
///         site.requested == ServiceType::named("Config")
///     }
///
///     fn plan(&self, _ctx: &mut ResolutionContext<'_>, _site: &DependencySite) -> Result<Option<Plan>> {
///         Ok(Some(Plan::constant(instance("debug=true"))))
///     }
/// }
/// ```
pub trait DependencyResolver: Send + Sync {
    fn can_handle(&self, ctx: &ResolutionContext<'_>, site: &DependencySite) -> bool;

    /// Plan `site`, or `None` when the shape turns out unsatisfiable.
    fn plan(&self, ctx: &mut ResolutionContext<'_>, site: &DependencySite) -> Result<Option<Plan>>;

    /// Whether [`DependencyResolver::plan_all`] yields one plan per binding.
    fn supports_enumerable(&self) -> bool {
        false
    }

    /// Element plans when `site` is the item type of a collection request.
    fn plan_all(&self, ctx: &mut ResolutionContext<'_>, site: &DependencySite) -> Result<Vec<Plan>> {
        Ok(self.plan(ctx, site)?.into_iter().collect())
    }
}

/// A registration picked for a site, with its closed implementation type.
struct Selected {
    registration: Arc<ServiceRegistration>,
    implementation: ServiceType,
}

impl<'a> ResolutionContext<'a> {
    // =========================================================================
    // Entry points
    // =========================================================================

    /// Plan the request itself.
    pub(crate) fn plan_top_level(&mut self, service_type: &ServiceType, name: Option<&str>) -> Result<Option<Plan>> {
        let site = DependencySite::new(service_type.clone()).keyed(name.map(Arc::from));
        self.plan_dependency(&site)
    }

    /// Plan one dependency site; `None` when nothing satisfies it.
    pub fn plan_dependency(&mut self, site: &DependencySite) -> Result<Option<Plan>> {
        if site.dependency_name.is_none() && self.config.member_name_as_dependency_name() {
            if let Some(member) = site.member_name.clone() {
                if let Some(plan) = self.plan_site(&site.keyed(Some(member)))? {
                    return Ok(Some(plan));
                }
            }
        }
        self.plan_site(site)
    }

    /// Element plans for every eligible binding of `site.requested`,
    /// ascending by registration order.
    pub fn plan_all_dependencies(&mut self, site: &DependencySite) -> Result<Vec<Plan>> {
        let selected = self.select_all(site);
        if !selected.is_empty() {
            return selected
                .into_iter()
                .map(|s| self.plan_registration_for(&s, site))
                .collect();
        }

        let config = Arc::clone(&self.config);
        for resolver in resolvers::chain(&config) {
            if resolver.supports_enumerable() && resolver.can_handle(self, site) {
                return resolver.plan_all(self, site);
            }
        }

        Ok(Vec::new())
    }

    pub(crate) fn plan_all(&mut self, service_type: &ServiceType) -> Result<Vec<Plan>> {
        self.plan_all_dependencies(&DependencySite::new(service_type.clone()))
    }

    fn plan_site(&mut self, site: &DependencySite) -> Result<Option<Plan>> {
        #[cfg(feature = "logging")]
        trace!(target: "ioc_graph", site = %site.describe(), "Planning dependency");

        if let Some(value) = self.find_override(site) {
            return Ok(Some(Plan::constant(value)));
        }

        if let Some(value) = self.scope.scoped_instance(&site.requested, site.dependency_name.as_ref()) {
            return Ok(Some(Plan::constant(value)));
        }

        if let Some(argument) = self.find_argument(&site.requested) {
            return Ok(Some(argument));
        }

        if let Some(selected) = self.select(site, false) {
            return self.plan_registration_for(&selected, site).map(Some);
        }

        let config = Arc::clone(&self.config);
        for resolver in resolvers::chain(&config) {
            if resolver.can_handle(self, site) {
                if let Some(plan) = resolver.plan(self, site)? {
                    return Ok(Some(plan));
                }
            }
        }

        self.plan_unknown(site)
    }

    // =========================================================================
    // Binding selection
    // =========================================================================

    /// Highest-numbered eligible registration, nearest container first.
    ///
    /// `open` selects from the open definition's bucket instead of the
    /// exact one.
    fn select(&self, site: &DependencySite, open: bool) -> Option<Selected> {
        let top_level = self.is_top_level();
        self.containers().find_map(|container| {
            let candidates = container.registrations.candidates(&site.requested);
            let bucket = if open { candidates.open } else { candidates.closed };
            let mut best: Option<Selected> = None;

            for registration in bucket.iter().flat_map(|b| b.iter()) {
                if !self.name_matches(registration, site) || !self.scope_name_matches(registration) {
                    continue;
                }
                if !top_level && !registration.accepts(site) {
                    continue;
                }
                if best
                    .as_ref()
                    .is_some_and(|b| b.registration.number() >= registration.number())
                {
                    continue;
                }
                let Some(implementation) = self.closed_implementation(registration, &site.requested) else {
                    continue;
                };
                best = Some(Selected {
                    registration: Arc::clone(registration),
                    implementation,
                });
            }

            best
        })
    }

    /// Every eligible registration of the nearest container that has any.
    fn select_all(&self, site: &DependencySite) -> Vec<Selected> {
        for container in self.containers() {
            let candidates: Candidates = container.registrations.candidates(&site.requested);
            let mut selected: Vec<Selected> = candidates
                .iter()
                .filter(|r| self.scope_name_matches(r) && r.accepts(site))
                .filter_map(|r| {
                    self.closed_implementation(r, &site.requested).map(|implementation| Selected {
                        registration: Arc::clone(r),
                        implementation,
                    })
                })
                .collect();

            if !selected.is_empty() {
                selected.sort_by_key(|s| s.registration.number());
                return selected;
            }
        }
        Vec::new()
    }

    fn name_matches(&self, registration: &ServiceRegistration, site: &DependencySite) -> bool {
        match &site.dependency_name {
            Some(name) => registration.name() == Some(&**name),
            None => true,
        }
    }

    fn scope_name_matches(&self, registration: &ServiceRegistration) -> bool {
        match registration.lifetime().scope_name() {
            Some(required) => self.scope_names().iter().any(|name| &**name == required),
            None => true,
        }
    }

    /// The implementation type that serves `requested`, closed if the
    /// registration is open generic. `None` when it cannot be closed or the
    /// closing arguments violate a declared constraint.
    fn closed_implementation(&self, registration: &ServiceRegistration, requested: &ServiceType) -> Option<ServiceType> {
        if !registration.is_open_generic() {
            return Some(registration.implementation_type().clone());
        }
        let definition = registration.implementation_type().generic_definition()?;
        let closed = self.close_generic(&definition, requested)?;
        self.satisfies_constraints(&definition, &closed).then_some(closed)
    }

    fn close_generic(&self, definition: &ServiceType, requested: &ServiceType) -> Option<ServiceType> {
        if !requested.is_closed_generic() {
            return None;
        }
        if requested.generic_definition().as_ref() == Some(definition) {
            return Some(requested.clone());
        }

        let requested_definition = requested.generic_definition();
        self.introspector()
            .implemented_types(definition)
            .into_iter()
            .filter(|contract| contract.generic_definition() == requested_definition)
            .find_map(|contract| {
                let mut bindings = vec![None; definition.arity()];
                if !contract.unify(requested, &mut bindings) {
                    return None;
                }
                let args: Option<Vec<_>> = bindings.into_iter().collect();
                definition.close(&args?)
            })
    }

    fn satisfies_constraints(&self, definition: &ServiceType, closed: &ServiceType) -> bool {
        let introspector = self.introspector();
        let args = closed.args();

        introspector.generic_constraints(definition).iter().all(|constraint| {
            let Some(arg) = args.get(constraint.parameter) else {
                return false;
            };
            match &constraint.kind {
                ConstraintKind::ReferenceType => introspector.is_reference_type(arg),
                ConstraintKind::DefaultConstructor => introspector
                    .constructors(arg)
                    .iter()
                    .any(|ctor| ctor.public && ctor.parameters.is_empty()),
                ConstraintKind::Implements(contract) => {
                    introspector.is_assignable(arg, &contract.substitute(args))
                }
            }
        })
    }

    // =========================================================================
    // Registrations
    // =========================================================================

    fn plan_registration_for(&mut self, selected: &Selected, site: &DependencySite) -> Result<Plan> {
        self.plan_registration(&selected.registration, &selected.implementation, site)
    }

    /// Full plan for one registration: construction, initializer, lifetime
    /// and decorators.
    pub(crate) fn plan_registration(
        &mut self,
        registration: &ServiceRegistration,
        implementation: &ServiceType,
        site: &DependencySite,
    ) -> Result<Plan> {
        let identity = (Some(registration.id()), implementation.clone());
        if !self.enter(identity.clone()) {
            return Err(DiError::circular(implementation));
        }
        let planned = self.plan_registration_inner(registration, implementation, site);
        self.leave(&identity);
        planned
    }

    fn plan_registration_inner(
        &mut self,
        registration: &ServiceRegistration,
        implementation: &ServiceType,
        site: &DependencySite,
    ) -> Result<Plan> {
        let plan = match registration.source() {
            ImplementationSource::Instance(value) => {
                return self.decorate(&site.requested, site, Plan::constant(Arc::clone(value)));
            }
            ImplementationSource::Factory(delegate) => {
                Plan::from_factory(registration.service_type().clone(), Arc::clone(delegate))
            }
            ImplementationSource::Type(_) => self.plan_implementation(implementation, None)?,
        };

        let plan = match registration.initializer() {
            Some(initializer) => Plan::initialize(plan, Arc::clone(initializer)),
            None => plan,
        };

        let disposer = if registration.tracks_disposal() {
            self.introspector().disposer(implementation)
        } else {
            None
        };
        let plan = registration.lifetime().apply(registration, implementation, plan, disposer);

        self.decorate(&site.requested, site, plan)
    }

    /// Wrap `inner` in every decorator of `service_type`, innermost first.
    fn decorate(&mut self, service_type: &ServiceType, site: &DependencySite, inner: Plan) -> Result<Plan> {
        let decorators = self.select_decorators(service_type, site);
        let mut plan = inner;

        for selected in decorators {
            let decorator = &selected.registration;
            let identity = (Some(decorator.id()), selected.implementation.clone());
            if !self.enter(identity.clone()) {
                return Err(DiError::circular(&selected.implementation));
            }
            let decorated = self.plan_implementation(&selected.implementation, Some((service_type, &plan)));
            self.leave(&identity);

            let disposer = if decorator.tracks_disposal() {
                self.introspector().disposer(&selected.implementation)
            } else {
                None
            };
            let decorated = match decorator.initializer() {
                Some(initializer) => Plan::initialize(decorated?, Arc::clone(initializer)),
                None => decorated?,
            };
            plan = decorator
                .lifetime()
                .apply(decorator, &selected.implementation, decorated, disposer);
        }

        Ok(plan)
    }

    fn select_decorators(&self, service_type: &ServiceType, site: &DependencySite) -> Vec<Selected> {
        let mut selected: Vec<Selected> = self
            .containers()
            .flat_map(|container| container.decorators.candidates(service_type).iter().cloned().collect::<Vec<_>>())
            .filter(|d| self.scope_name_matches(d) && d.accepts(site))
            .filter_map(|d| {
                let implementation = self.closed_implementation(&d, service_type)?;
                Some(Selected {
                    registration: d,
                    implementation,
                })
            })
            .collect();
        selected.sort_by_key(|s| s.registration.number());
        selected
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Construction plan for a concrete type: the first usable constructor
    /// in selection order, then member and method injection.
    ///
    /// `decoratee` binds direct constructor parameters of the decorated
    /// service type to the plan being decorated.
    pub(crate) fn plan_implementation(
        &mut self,
        implementation: &ServiceType,
        decoratee: Option<(&ServiceType, &Plan)>,
    ) -> Result<Plan> {
        let mut constructors: Vec<_> = self
            .introspector()
            .constructors(implementation)
            .into_iter()
            .filter(|ctor| ctor.public)
            .collect();
        if constructors.is_empty() {
            return Err(DiError::no_usable_constructor(implementation, Vec::new()));
        }
        self.config.constructor_selection().sort(&mut constructors);

        let mut unresolved = Vec::new();
        'constructors: for constructor in constructors {
            let mut arguments = Vec::with_capacity(constructor.parameters.len());

            for parameter in &constructor.parameters {
                if let Some((decorated, plan)) = decoratee {
                    if parameter.requested == *decorated {
                        arguments.push(plan.clone());
                        continue;
                    }
                }

                match self.plan_parameter(parameter) {
                    Ok(Some(plan)) => arguments.push(plan),
                    Ok(None) => {
                        unresolved.push(parameter.describe());
                        continue 'constructors;
                    }
                    Err(err) if err.is_unresolvable() => {
                        unresolved.push(err.describe_unresolved());
                        continue 'constructors;
                    }
                    Err(err) => return Err(err),
                }
            }

            let wiring = self.plan_wiring(implementation)?;
            return Ok(Plan::construct(Construct {
                implementation: implementation.clone(),
                activator: constructor.activator,
                arguments,
                wiring,
            }));
        }

        Err(DiError::no_usable_constructor(implementation, unresolved))
    }

    /// A site's plan, falling back to its default value.
    fn plan_parameter(&mut self, site: &DependencySite) -> Result<Option<Plan>> {
        match self.plan_dependency(site)? {
            Some(plan) => Ok(Some(plan)),
            None => Ok(site.default_value.clone().map(Plan::constant)),
        }
    }

    /// Member and method injection for `implementation`.
    ///
    /// Auto-injected members that cannot be resolved are skipped; annotated
    /// members and method parameters are required.
    pub(crate) fn plan_wiring(&mut self, implementation: &ServiceType) -> Result<Wiring> {
        let introspector = self.container.introspector();
        let members = introspector.injectable_members(implementation, self.config.member_injection());
        let methods = introspector.injection_methods(implementation);

        let mut wiring = Wiring::default();
        for member in members {
            match self.plan_required(&member.site, member.annotated)? {
                Some(plan) => wiring.members.push((member.setter, plan)),
                None => continue,
            }
        }

        for method in methods {
            let mut parameters = Vec::with_capacity(method.parameters.len());
            for parameter in &method.parameters {
                if let Some(plan) = self.plan_required(parameter, true)? {
                    parameters.push(plan);
                }
            }
            wiring.methods.push((method.invoker, parameters));
        }

        Ok(wiring)
    }

    /// Plan a member or method site. A required site that cannot be
    /// satisfied fails with `ResolutionFailed`.
    fn plan_required(&mut self, site: &DependencySite, required: bool) -> Result<Option<Plan>> {
        match self.plan_parameter(site) {
            Ok(Some(plan)) => Ok(Some(plan)),
            Ok(None) if !required => Ok(None),
            Err(err) if !required && err.is_unresolvable() => Ok(None),
            Ok(None) => Err(DiError::resolution_failed(&site.requested, site.dependency_name.as_deref())),
            Err(err) if err.is_unresolvable() => Err(DiError::resolution_failed(
                &site.requested,
                site.dependency_name.as_deref(),
            )),
            Err(err) => Err(err),
        }
    }

    /// Ad hoc construction of a concrete type, bypassing the store.
    pub(crate) fn plan_activation(&mut self, implementation: &ServiceType) -> Result<Plan> {
        if !self.introspector().is_concrete(implementation) {
            return Err(DiError::no_usable_constructor(implementation, Vec::new()));
        }

        let identity = (None, implementation.clone());
        self.enter(identity.clone());
        let planned = self.plan_implementation(implementation, None);
        self.leave(&identity);
        planned
    }

    // =========================================================================
    // Unknown types
    // =========================================================================

    /// Treat an unregistered concrete type as self-registered, when the
    /// configuration allows it.
    fn plan_unknown(&mut self, site: &DependencySite) -> Result<Option<Plan>> {
        let Some(lifetime) = self.config.unknown_type_resolution().cloned() else {
            return Ok(None);
        };
        let requested = &site.requested;
        if site.dependency_name.is_some() || !self.introspector().is_concrete(requested) {
            return Ok(None);
        }

        // implicit registrations get fresh ids while validating, so guard
        // the type itself
        let identity = (None, requested.clone());
        if !self.enter(identity.clone()) {
            return Err(DiError::circular(requested));
        }

        let container = Arc::clone(&self.container);
        let registration = Arc::new(ServiceRegistration::new(
            &container.counters,
            requested.clone(),
            ImplementationSource::Type(requested.clone()),
            RegistrationOptions::new().with_lifetime(lifetime),
        ));

        let registration = if self.is_validating() {
            registration
        } else {
            adopt(&container.registrations, requested, registration)
        };

        let planned = self.plan_registration(&registration, requested, site);
        self.leave(&identity);
        planned.map(Some)
    }
}

/// Publish an implicit self-registration, or pick up the one a concurrent
/// request published first so both share one instance slot.
fn adopt(
    store: &RegistrationStore,
    service_type: &ServiceType,
    registration: Arc<ServiceRegistration>,
) -> Arc<ServiceRegistration> {
    if store
        .add_or_update(service_type, Arc::clone(&registration), false, Duplicates::Skip)
        .changed()
    {
        return registration;
    }

    store
        .bucket(service_type)
        .and_then(|bucket| bucket.iter().rev().find(|r| r.same_identity(&registration)).cloned())
        .unwrap_or(registration)
}

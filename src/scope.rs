//! Resolution scopes
//!
//! A [`ResolutionScope`] is the runtime context every request runs in. It
//! owns scope-local instance storage, the compiled-factory cache, the
//! instances put directly into it and a disposal list. Scopes form a tree
//! through parent links; a child never copies anything from its parent,
//! so scoped state is local by construction.
//!
//! Every piece of mutable state is an immutable snapshot published through
//! compare-and-swap.

use crate::container::ContainerContext;
use crate::context::{DependencyOverride, ResolutionContext, ResolveRequest};
use crate::factory::{CacheKey, FactoryCache, FactoryFn, compile};
use crate::plan::{Frame, Plan, SlotKey};
use crate::registration::RegistrationId;
use crate::tree::{ImmutableStack, ImmutableTree, Swap};
use crate::{DiError, Disposer, Injectable, Instance, Result, ServiceType, downcast};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type Slot = Arc<OnceCell<Instance>>;
type ScopedKey = (ServiceType, Option<Arc<str>>);

struct ScopeInner {
    context: Arc<ContainerContext>,
    parent: Option<ResolutionScope>,
    name: Option<Arc<str>>,
    container_root: bool,
    /// Lifetime-managed instances, one slot per registration and implementation
    instances: Swap<ImmutableTree<SlotKey, Slot>>,
    /// Instances put directly into this scope
    scoped_instances: Swap<ImmutableTree<ScopedKey, Instance>>,
    /// Bumped whenever scope-local inputs to planning change
    local_version: AtomicU64,
    factories: FactoryCache,
    /// `None` once disposed
    disposables: Swap<Option<ImmutableStack<(Instance, Disposer)>>>,
    disposed: AtomicBool,
}

/// A node of the scope tree; cheap to clone.
#[derive(Clone)]
pub struct ResolutionScope {
    inner: Arc<ScopeInner>,
}

/// Non-owning handle to a scope.
///
/// Held by lazy and factory values, which may themselves be cached inside
/// the scope they resolve from.
#[derive(Clone)]
pub(crate) struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    /// The scope, or `Disposed` once it has been dropped.
    pub(crate) fn upgrade(&self) -> Result<ResolutionScope> {
        self.inner
            .upgrade()
            .map(|inner| ResolutionScope { inner })
            .ok_or(DiError::Disposed)
    }
}

/// Parent-chain iterator, starting at the scope itself.
pub(crate) struct Ancestors<'a> {
    next: Option<&'a ResolutionScope>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ResolutionScope;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.inner.parent.as_ref();
        Some(current)
    }
}

impl ResolutionScope {
    fn create(
        context: Arc<ContainerContext>,
        parent: Option<ResolutionScope>,
        name: Option<Arc<str>>,
        container_root: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                context,
                parent,
                name,
                container_root,
                instances: Swap::new(ImmutableTree::empty()),
                scoped_instances: Swap::new(ImmutableTree::empty()),
                local_version: AtomicU64::new(0),
                factories: FactoryCache::new(),
                disposables: Swap::new(Some(ImmutableStack::empty())),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Root scope of a (possibly child) container.
    pub(crate) fn container_root(context: Arc<ContainerContext>, parent: Option<ResolutionScope>) -> Self {
        Self::create(context, parent, None, true)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `service_type`, failing with `ResolutionFailed` when nothing
    /// satisfies it.
    #[inline]
    pub fn resolve(&self, service_type: &ServiceType) -> Result<Instance> {
        self.resolve_required(ResolveRequest::new(service_type.clone()))
    }

    /// Resolve the registration bound under `name`.
    #[inline]
    pub fn resolve_named(&self, service_type: &ServiceType, name: &str) -> Result<Instance> {
        self.resolve_required(ResolveRequest::new(service_type.clone()).named(name))
    }

    /// Resolve, returning `None` when nothing satisfies the request.
    #[inline]
    pub fn try_resolve(&self, service_type: &ServiceType) -> Result<Option<Instance>> {
        self.resolve_with(&ResolveRequest::new(service_type.clone()).null_allowed())
    }

    /// Typed resolution by [`ServiceType::of`].
    ///
    /// ```rust
    /// use ioc_graph::{Container, RegistrationOptions, ServiceType, instance};
    ///
    /// let container = Container::new();
    /// container
    ///     .register_instance(ServiceType::of::<u32>(), instance(7u32), RegistrationOptions::new())
    ///     .unwrap();
    /// assert_eq!(*container.get::<u32>().unwrap(), 7);
    /// ```
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        downcast(self.resolve(&service_type)?, &service_type)
    }

    /// Typed resolution of a named binding.
    pub fn get_named<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        let service_type = ServiceType::of::<T>();
        downcast(self.resolve_named(&service_type, name)?, &service_type)
    }

    /// Typed resolution returning `None` when unresolvable.
    pub fn try_get<T: Injectable>(&self) -> Result<Option<Arc<T>>> {
        let service_type = ServiceType::of::<T>();
        self.try_resolve(&service_type)?
            .map(|resolved| downcast(resolved, &service_type))
            .transpose()
    }

    /// Resolve `service_type` and downcast the result to `T`.
    pub fn resolve_as<T: Injectable>(&self, service_type: &ServiceType) -> Result<Arc<T>> {
        downcast(self.resolve(service_type)?, service_type)
    }

    fn resolve_required(&self, request: ResolveRequest) -> Result<Instance> {
        match self.resolve_with(&request)? {
            Some(resolved) => Ok(resolved),
            None => Err(DiError::resolution_failed(&request.service_type, request.name.as_deref())),
        }
    }

    /// Resolve a full request.
    ///
    /// Requests without overrides go through the scope's factory cache.
    /// An unresolvable graph becomes `Ok(None)` when the request allows
    /// null; every other error propagates.
    pub fn resolve_with(&self, request: &ResolveRequest) -> Result<Option<Instance>> {
        self.ensure_alive()?;

        let cacheable = request.overrides.is_empty();
        let key = CacheKey::Service {
            ty: request.service_type.clone(),
            name: request.name.clone(),
        };
        let version = self.version();

        if cacheable {
            if let Some(factory) = self.inner.factories.get(&key, version) {
                return factory(&Frame::new(self)).map(Some);
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            service = %request.service_type,
            name = request.name.as_deref(),
            "Planning resolution"
        );

        let mut ctx = ResolutionContext::new(self, request.null_allowed, &request.overrides);
        let planned = match ctx.plan_top_level(&request.service_type, request.name.as_deref()) {
            Err(err) if request.null_allowed && err.is_unresolvable() => return Ok(None),
            planned => planned?,
        };

        match planned {
            Some(plan) => {
                let factory = compile(&plan);
                if cacheable {
                    self.inner.factories.publish(key, version, Arc::clone(&factory));
                }
                factory(&Frame::new(self)).map(Some)
            }
            None if request.null_allowed => Ok(None),
            None => Err(DiError::resolution_failed(&request.service_type, request.name.as_deref())),
        }
    }

    /// Every eligible binding of `service_type`, ascending by registration order.
    pub fn resolve_all(&self, service_type: &ServiceType) -> Result<Vec<Instance>> {
        self.ensure_alive()?;

        let key = CacheKey::All(service_type.clone());
        let version = self.version();
        let factory = match self.inner.factories.get(&key, version) {
            Some(factory) => factory,
            None => {
                let mut ctx = ResolutionContext::new(self, false, &[]);
                let plans = ctx.plan_all(service_type)?;
                let factory = compile(&Plan::collection(plans));
                self.inner.factories.publish(key, version, Arc::clone(&factory));
                factory
            }
        };

        let items = downcast::<Vec<Instance>>(factory(&Frame::new(self))?, service_type)?;
        Ok(items.as_ref().clone())
    }

    /// A factory producing `service_type` from `parameters`-typed arguments.
    ///
    /// Arguments are matched to dependency sites by type at any depth of
    /// the produced graph.
    pub fn resolve_factory(
        &self,
        service_type: &ServiceType,
        name: Option<&str>,
        parameters: &[ServiceType],
    ) -> Result<Arc<FactoryFn>> {
        self.ensure_alive()?;

        let func_type = ServiceType::func(parameters.iter().cloned(), service_type.clone());
        let key = CacheKey::Func {
            ty: service_type.clone(),
            name: name.map(Arc::from),
            parameters: parameters.to_vec(),
        };
        let version = self.version();

        let factory = match self.inner.factories.get(&key, version) {
            Some(factory) => factory,
            None => {
                let mut ctx = ResolutionContext::new(self, false, &[]);
                ctx.push_func_parameters(parameters.to_vec());
                let planned = ctx.plan_top_level(service_type, name);
                ctx.pop_func_parameters();

                let body = planned?.ok_or_else(|| DiError::resolution_failed(service_type, name))?;
                let factory = compile(&Plan::func(func_type.clone(), parameters.len(), body));
                self.inner.factories.publish(key, version, Arc::clone(&factory));
                factory
            }
        };

        downcast::<FactoryFn>(factory(&Frame::new(self))?, &func_type)
    }

    /// Inject members and methods into an externally created instance.
    pub fn build_up(&self, target: Instance, service_type: &ServiceType) -> Result<Instance> {
        self.ensure_alive()?;

        let mut ctx = ResolutionContext::new(self, false, &[]);
        let wiring = ctx.plan_wiring(service_type)?;
        Plan::build_up(Plan::constant(target), wiring).evaluate(&Frame::new(self))
    }

    /// Construct `service_type` directly, bypassing the registration store.
    ///
    /// `overrides` take precedence over registrations for every site.
    pub fn activate(&self, service_type: &ServiceType, overrides: &[DependencyOverride]) -> Result<Instance> {
        self.ensure_alive()?;

        let mut ctx = ResolutionContext::new(self, false, overrides);
        let plan = ctx.plan_activation(service_type)?;
        plan.evaluate(&Frame::new(self))
    }

    /// Whether `service_type` could be resolved, without constructing it.
    pub fn can_resolve(&self, service_type: &ServiceType, name: Option<&str>) -> Result<bool> {
        self.ensure_alive()?;

        let key = CacheKey::Service {
            ty: service_type.clone(),
            name: name.map(Arc::from),
        };
        if self.inner.factories.get(&key, self.version()).is_some() {
            return Ok(true);
        }

        let mut ctx = ResolutionContext::for_validation(self);
        Ok(matches!(ctx.plan_top_level(service_type, name), Ok(Some(_))))
    }

    // =========================================================================
    // Scope lifecycle
    // =========================================================================

    /// A child scope with its own scoped storage.
    pub fn begin_scope(&self) -> Result<ResolutionScope> {
        self.begin(None)
    }

    /// A child scope carrying `name`, for named-scope registrations.
    pub fn begin_named_scope(&self, name: impl Into<Arc<str>>) -> Result<ResolutionScope> {
        self.begin(Some(name.into()))
    }

    fn begin(&self, name: Option<Arc<str>>) -> Result<ResolutionScope> {
        self.ensure_alive()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            name = name.as_deref(),
            parent = self.name(),
            "Beginning scope"
        );

        Ok(Self::create(Arc::clone(&self.inner.context), Some(self.clone()), name, false))
    }

    /// Make `value` the answer for `service_type` requests made through
    /// this scope.
    pub fn put_instance_in_scope(&self, service_type: &ServiceType, value: Instance) -> Result<()> {
        self.put_scoped(service_type, None, value)
    }

    /// Like [`ResolutionScope::put_instance_in_scope`], under a binding key.
    pub fn put_named_instance_in_scope(&self, service_type: &ServiceType, name: &str, value: Instance) -> Result<()> {
        self.put_scoped(service_type, Some(Arc::from(name)), value)
    }

    fn put_scoped(&self, service_type: &ServiceType, name: Option<Arc<str>>, value: Instance) -> Result<()> {
        self.ensure_alive()?;

        let key = (service_type.clone(), name);
        self.inner
            .scoped_instances
            .update(|tree| Some((tree.insert(key.clone(), Arc::clone(&value)), ())));
        self.inner.local_version.fetch_add(1, Ordering::SeqCst);

        #[cfg(feature = "logging")]
        debug!(target: "ioc_graph", service = %service_type, "Instance put in scope");

        Ok(())
    }

    /// Dispose tracked instances in reverse creation order.
    ///
    /// Idempotent. Every other operation fails with `Disposed` afterwards.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let snapshot = self.inner.disposables.replace(None);
        let Some(tracked) = snapshot.as_ref() else {
            return;
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            name = self.name(),
            tracked = tracked.len(),
            "Disposing scope"
        );

        for (value, disposer) in tracked.iter() {
            disposer(value);
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    #[inline]
    pub fn parent(&self) -> Option<&ResolutionScope> {
        self.inner.parent.as_ref()
    }

    /// Whether this scope holds a constructed instance of `registration`.
    pub fn contains_instance(&self, registration: RegistrationId) -> bool {
        self.inner
            .instances
            .load()
            .iter()
            .any(|(key, slot)| key.registration == registration && slot.get().is_some())
    }

    // =========================================================================
    // Crate internals
    // =========================================================================

    #[inline]
    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(DiError::Disposed)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub(crate) fn context(&self) -> &Arc<ContainerContext> {
        &self.inner.context
    }

    pub(crate) fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    #[inline]
    pub(crate) fn is_container_root(&self) -> bool {
        self.inner.container_root
    }

    pub(crate) fn rebuilds_singletons(&self) -> bool {
        self.inner.context.config().rebuild_singletons_in_child()
    }

    /// Names of this scope and its ancestors, innermost first.
    pub(crate) fn scope_names(&self) -> Vec<Arc<str>> {
        self.ancestors().filter_map(|s| s.inner.name.clone()).collect()
    }

    /// Cache version: container-wide inputs plus this scope's own.
    fn version(&self) -> u64 {
        self.inner.context.version() + self.inner.local_version.load(Ordering::SeqCst)
    }

    /// Instance put into this scope for `service_type` under `name`.
    pub(crate) fn scoped_instance(&self, service_type: &ServiceType, name: Option<&Arc<str>>) -> Option<Instance> {
        let key = (service_type.clone(), name.cloned());
        self.inner.scoped_instances.load().get(&key).cloned()
    }

    /// The storage slot for `key`, created on first request.
    pub(crate) fn instance_slot(&self, key: &SlotKey) -> Slot {
        if let Some(slot) = self.inner.instances.load().get(key) {
            return Arc::clone(slot);
        }

        let mut existing = None;
        let created = self.inner.instances.update(|tree| {
            if let Some(slot) = tree.get(key) {
                existing = Some(Arc::clone(slot));
                return None;
            }
            let slot: Slot = Arc::new(OnceCell::new());
            Some((tree.insert(key.clone(), Arc::clone(&slot)), slot))
        });

        created.or(existing).unwrap_or_else(|| Arc::new(OnceCell::new()))
    }

    /// Add an instance to this scope's disposal list.
    ///
    /// A scope that is already disposed disposes the instance immediately.
    pub(crate) fn track(&self, value: &Instance, disposer: &Disposer) {
        let pushed = self.inner.disposables.update(|stack| {
            stack
                .as_ref()
                .map(|stack| (Some(stack.push((Arc::clone(value), Arc::clone(disposer)))), ()))
        });
        if pushed.is_none() {
            disposer(value);
            return;
        }

        #[cfg(feature = "logging")]
        trace!(target: "ioc_graph", scope = self.name(), "Tracking disposable");
    }
}

impl fmt::Debug for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionScope")
            .field("name", &self.inner.name)
            .field("container_root", &self.inner.container_root)
            .field("disposed", &self.is_disposed())
            .field("instances", &self.inner.instances.load().len())
            .field("tracked", &self.inner.disposables.load().as_ref().as_ref().map_or(0, |s| s.len()))
            .finish()
    }
}

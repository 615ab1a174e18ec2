//! Lifetime policies
//!
//! A lifetime decides which scope's instance storage, if any, holds the
//! product of a registration. Storage is looked up at run time from the
//! resolving scope, so one compiled factory serves every scope it is
//! cached in.

use crate::plan::{Frame, Plan, SlotKey};
use crate::registration::ServiceRegistration;
use crate::scope::ResolutionScope;
use crate::{DiError, Disposer, Instance, Result, ServiceType};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// How long a constructed instance is reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// A new instance for every resolution
    #[default]
    Transient,
    /// One instance per resolution scope
    Scoped,
    /// One instance per container tree (or per rebuilding child container)
    Singleton,
    /// One instance per scope carrying the given name
    NamedScope(Arc<str>),
}

impl Lifetime {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Lifetime::Transient)
    }

    /// Scope name a [`Lifetime::NamedScope`] registration requires.
    pub fn scope_name(&self) -> Option<&str> {
        match self {
            Lifetime::NamedScope(name) => Some(&**name),
            _ => None,
        }
    }

    /// Wrap a base plan with this lifetime's storage.
    ///
    /// `implementation` is the closed implementation type; together with
    /// the registration id it keys the instance slot.
    pub(crate) fn apply(
        &self,
        registration: &ServiceRegistration,
        implementation: &ServiceType,
        plan: Plan,
        disposer: Option<Disposer>,
    ) -> Plan {
        match self {
            Lifetime::Transient => match disposer {
                Some(disposer) => Plan::tracked(plan, disposer),
                None => plan,
            },
            _ => Plan::cached(
                SlotKey {
                    registration: registration.id(),
                    implementation: implementation.clone(),
                },
                self.clone(),
                plan,
                disposer,
            ),
        }
    }

    /// The scope whose storage holds instances of this lifetime when
    /// resolving from `scope`.
    pub(crate) fn target_scope<'s>(&self, scope: &'s ResolutionScope) -> Result<&'s ResolutionScope> {
        match self {
            Lifetime::Transient | Lifetime::Scoped => Ok(scope),
            Lifetime::Singleton => {
                let mut root = scope;
                for candidate in scope.ancestors() {
                    if candidate.is_container_root()
                        && (candidate.parent().is_none() || candidate.rebuilds_singletons())
                    {
                        return Ok(candidate);
                    }
                    root = candidate;
                }
                Ok(root)
            }
            Lifetime::NamedScope(name) => scope
                .ancestors()
                .find(|candidate| candidate.name() == Some(&**name))
                .ok_or_else(|| {
                    DiError::creation_failed(
                        &ServiceType::named(format!("scope '{name}'")),
                        "no enclosing scope carries this name",
                    )
                }),
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Transient => f.write_str("transient"),
            Lifetime::Scoped => f.write_str("scoped"),
            Lifetime::Singleton => f.write_str("singleton"),
            Lifetime::NamedScope(name) => write!(f, "named-scope({name})"),
        }
    }
}

/// Run `build` at most once per slot of the target scope.
///
/// The product is built against the owning scope, so its own dependencies
/// and disposal tracking land there too.
pub(crate) fn resolve_cached<F>(
    frame: &Frame<'_>,
    key: &SlotKey,
    lifetime: &Lifetime,
    disposer: Option<&Disposer>,
    build: F,
) -> Result<Instance>
where
    F: FnOnce(&Frame<'_>) -> Result<Instance>,
{
    let target = lifetime.target_scope(frame.scope)?;
    target.ensure_alive()?;
    let slot = target.instance_slot(key);

    slot.get_or_try_init(|| {
        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            implementation = %key.implementation,
            registration = %key.registration,
            %lifetime,
            "Creating cached instance"
        );

        let owned = Frame {
            scope: target,
            arguments: frame.arguments,
        };
        let instance = build(&owned)?;
        if let Some(disposer) = disposer {
            target.track(&instance, disposer);
        }
        Ok(instance)
    })
    .cloned()
}

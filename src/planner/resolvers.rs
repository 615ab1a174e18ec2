//! Built-in dependency-shape resolvers

use super::DependencyResolver;
use crate::config::ContainerConfiguration;
use crate::context::ResolutionContext;
use crate::introspect::DependencySite;
use crate::plan::Plan;
use crate::types::well_known;
use crate::{Result, ServiceType};

#[cfg(feature = "logging")]
use tracing::trace;

/// The dependency shapes understood without configuration, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltInResolver {
    /// Close an open generic registration for a closed request
    OpenGeneric,
    /// `Enumerable<T>`: one element per eligible binding of `T`
    Enumerable,
    /// `Lazy<T>`: construction deferred to first access
    Lazy,
    /// `Func<P.., T>`: a callable binding its arguments into `T`'s graph
    Func,
    /// `Tuple<T..>`: every slot planned independently
    Tuple,
}

pub(crate) static BUILT_IN: [BuiltInResolver; 5] = [
    BuiltInResolver::OpenGeneric,
    BuiltInResolver::Enumerable,
    BuiltInResolver::Lazy,
    BuiltInResolver::Func,
    BuiltInResolver::Tuple,
];

/// Built-in resolvers followed by the configured external ones.
pub(crate) fn chain(config: &ContainerConfiguration) -> impl Iterator<Item = &dyn DependencyResolver> + '_ {
    let builtin = BUILT_IN.iter().map(|r| r as &dyn DependencyResolver);
    let external = config.resolvers().iter().map(|r| r.as_ref() as &dyn DependencyResolver);
    builtin.chain(external)
}

/// `(parameters, output)` of a `Func<..>` shape.
fn func_signature(ty: &ServiceType) -> Option<(&[ServiceType], &ServiceType)> {
    let (output, parameters) = ty.args().split_last()?;
    Some((parameters, output))
}

fn wrapped(ty: &ServiceType) -> Option<&ServiceType> {
    match ty.args() {
        [inner] => Some(inner),
        _ => None,
    }
}

impl DependencyResolver for BuiltInResolver {
    fn can_handle(&self, _ctx: &ResolutionContext<'_>, site: &DependencySite) -> bool {
        let requested = &site.requested;
        match self {
            Self::OpenGeneric => requested.is_closed_generic(),
            Self::Enumerable => requested.is_shape(well_known::ENUMERABLE) && requested.arity() == 1,
            Self::Lazy => requested.is_shape(well_known::LAZY) && requested.arity() == 1,
            Self::Func => requested.is_shape(well_known::FUNC),
            Self::Tuple => requested.is_shape(well_known::TUPLE),
        }
    }

    fn plan(&self, ctx: &mut ResolutionContext<'_>, site: &DependencySite) -> Result<Option<Plan>> {
        #[cfg(feature = "logging")]
        trace!(target: "ioc_graph", resolver = ?self, service = %site.requested, "Built-in resolver");

        match self {
            Self::OpenGeneric => match ctx.select(site, true) {
                Some(selected) => ctx.plan_registration_for(&selected, site).map(Some),
                None => Ok(None),
            },
            Self::Enumerable => {
                let Some(item) = wrapped(&site.requested) else {
                    return Ok(None);
                };
                let items = ctx.plan_all_dependencies(&site.with_requested(item.clone()))?;
                Ok(Some(Plan::collection(items)))
            }
            Self::Lazy => {
                let Some(inner) = wrapped(&site.requested) else {
                    return Ok(None);
                };
                Ok(ctx
                    .plan_dependency(&site.with_requested(inner.clone()))?
                    .map(Plan::deferred))
            }
            Self::Func => {
                let Some((parameters, output)) = func_signature(&site.requested) else {
                    return Ok(None);
                };
                ctx.push_func_parameters(parameters.to_vec());
                let body = ctx.plan_dependency(&site.with_requested(output.clone()));
                ctx.pop_func_parameters();
                Ok(body?.map(|body| Plan::func(site.requested.clone(), parameters.len(), body)))
            }
            Self::Tuple => {
                let mut slots = Vec::with_capacity(site.requested.arity());
                for slot in site.requested.args() {
                    match ctx.plan_dependency(&site.with_requested(slot.clone()))? {
                        Some(plan) => slots.push(plan),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Plan::tuple(slots)))
            }
        }
    }

    fn supports_enumerable(&self) -> bool {
        matches!(self, Self::Lazy | Self::Func)
    }

    /// One wrapper per binding of the wrapped type.
    fn plan_all(&self, ctx: &mut ResolutionContext<'_>, site: &DependencySite) -> Result<Vec<Plan>> {
        match self {
            Self::Lazy => {
                let Some(inner) = wrapped(&site.requested) else {
                    return Ok(Vec::new());
                };
                let plans = ctx.plan_all_dependencies(&site.with_requested(inner.clone()))?;
                Ok(plans.into_iter().map(Plan::deferred).collect())
            }
            Self::Func => {
                let Some((parameters, output)) = func_signature(&site.requested) else {
                    return Ok(Vec::new());
                };
                ctx.push_func_parameters(parameters.to_vec());
                let bodies = ctx.plan_all_dependencies(&site.with_requested(output.clone()));
                ctx.pop_func_parameters();
                Ok(bodies?
                    .into_iter()
                    .map(|body| Plan::func(site.requested.clone(), parameters.len(), body))
                    .collect())
            }
            _ => Ok(self.plan(ctx, site)?.into_iter().collect()),
        }
    }
}

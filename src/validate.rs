//! Registration validation
//!
//! Plans every registration of a container exactly as resolution would,
//! without compiling or executing anything, and reports every failure.

use crate::context::ResolutionContext;
use crate::introspect::DependencySite;
use crate::scope::ResolutionScope;
use crate::DiError;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Plan each registration of `scope`'s container once.
///
/// Open generic registrations are skipped since they cannot be planned
/// without concrete arguments.
pub(crate) fn validate(scope: &ResolutionScope) -> Result<(), Vec<DiError>> {
    scope.ensure_alive().map_err(|err| vec![err])?;

    let mappings = scope.context().registrations.mappings();
    let mut errors = Vec::new();

    for (service_type, registration) in &mappings {
        if registration.is_open_generic() || service_type.is_open_generic() {
            continue;
        }

        let mut site = DependencySite::new(service_type.clone());
        if let Some(name) = registration.name() {
            site = site.with_dependency_name(name);
        }

        let mut ctx = ResolutionContext::for_validation(scope);
        if let Some(scope_name) = registration.lifetime().scope_name() {
            ctx.enter_scope_name(scope_name);
        }
        if let Err(err) = ctx.plan_registration(registration, registration.implementation_type(), &site) {
            #[cfg(feature = "logging")]
            warn!(
                target: "ioc_graph",
                service = %service_type,
                registration = %registration.id(),
                error = %err,
                "Validation failure"
            );
            errors.push(err);
        }
    }

    #[cfg(feature = "logging")]
    debug!(
        target: "ioc_graph",
        registrations = mappings.len(),
        errors = errors.len(),
        "Validated container"
    );

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
